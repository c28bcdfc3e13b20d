use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::storage::StorageQuota;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StorageStatusResponse {
    pub backend: String,
    pub connected: bool,
    pub authenticated: bool,
    pub quota: Option<StorageQuota>,
}

/// Report the remote storage backend's connectivity, credential state, and
/// quota usage
pub async fn storage_status(State(state): State<AppState>) -> Result<Json<StorageStatusResponse>> {
    let connected = state.storage.test_connection().await;
    let authenticated = state.storage.is_authenticated().await;

    let quota = if connected {
        match state.storage.storage_quota().await {
            Ok(quota) => Some(quota),
            Err(e) => {
                tracing::warn!("Could not read storage quota: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(Json(StorageStatusResponse {
        backend: state.config.storage_backend.clone(),
        connected,
        authenticated,
        quota,
    }))
}
