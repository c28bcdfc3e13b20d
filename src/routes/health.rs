use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Health check endpoint
///
/// Returns the health status of the server, database, and remote storage.
/// Used by load balancers and monitoring systems.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    };

    let storage_status = if state.storage.test_connection().await {
        "connected"
    } else {
        "disconnected"
    };

    let healthy = db_status == "connected" && storage_status == "connected";

    Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "database": db_status,
        "storage": storage_status,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
