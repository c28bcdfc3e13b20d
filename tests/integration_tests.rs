//! Integration tests for the Healthrec Backup Server API
//!
//! These tests drive the complete backup -> restore cycle through the
//! router: dump, transform, upload, verify, selective apply, and the
//! progress/history endpoints.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use healthrec_backup_server::config::JobMode;
use healthrec_backup_server::{router, AppState, Config};

// Test configuration constants
const TEST_KEY: [u8; 32] = [0x42; 32];

// =============================================================================
// Test Helpers
// =============================================================================

/// Create a test configuration rooted in a temporary directory
fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0, // Random port
        database_url: String::new(), // Pool is created per test
        allowed_origins: vec!["http://localhost:5173".to_string()],
        storage_backend: "local".to_string(),
        storage_root: temp_dir.path().join("remote"),
        staging_dir: temp_dir.path().join("staging"),
        encryption_key: Some(TEST_KEY),
        job_mode: JobMode::Inline,
        lock_timeout_secs: 1800,
        environment: "test".to_string(),
    }
}

/// Create a migrated test database in a temporary directory
async fn create_test_db(temp_dir: &TempDir) -> SqlitePool {
    let db_path = temp_dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to create test database");
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Create a test app router plus the state behind it
async fn create_test_app(temp_dir: &TempDir) -> (Router, AppState) {
    let pool = create_test_db(temp_dir).await;
    let config = test_config(temp_dir);
    let storage = healthrec_backup_server::storage::create_storage(&config).unwrap();
    let state = AppState::new(pool, config, storage);
    (router(state.clone()), state)
}

/// Seed a few rows into every module's tables
async fn seed_health_data(pool: &SqlitePool) {
    sqlx::query("INSERT INTO patients (full_name, sex, address) VALUES ('Maria Cruz', 'F', 'Purok 3'), ('Ana Reyes', 'F', 'Purok 5')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO prenatal_visits (patient_id, visit_date, gestational_weeks, blood_pressure) VALUES (1, '2026-07-01', 24, '110/70')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO children (mother_id, full_name, sex, birth_weight_grams) VALUES (1, 'Baby Cruz', 'M', 3100)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO vaccines (name, manufacturer, doses_required) VALUES ('BCG', 'BioFarm', 1), ('Penta', 'SII', 3)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO vaccine_stocks (vaccine_id, batch_number, quantity) VALUES (1, 'B-2026-01', 40)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO immunizations (child_id, vaccine_id, dose_number, administered_at, administered_by) VALUES (1, 1, 1, '2026-07-15', 'bhw-02')")
        .execute(pool)
        .await
        .unwrap();
}

async fn table_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Parse response body as JSON
async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a POST request with JSON body
fn make_post_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor", "midwife-01")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Create a GET request
fn make_get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Create a DELETE request
fn make_delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Run a backup through the API and return (backup_id, response body)
async fn run_backup(app: &Router, modules: &[&str], options: &[&str]) -> (i64, Value) {
    let response = app
        .clone()
        .oneshot(make_post_request(
            "/api/backups",
            json!({ "modules": modules, "options": options }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(true), "backup failed: {}", body);
    let backup_id = body["backup_id"].as_i64().unwrap();
    (backup_id, body)
}

/// Fetch a backup record through the API
async fn fetch_backup(app: &Router, backup_id: i64) -> Value {
    let response = app
        .clone()
        .oneshot(make_get_request(&format!("/api/backups/{}", backup_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_to_json(response.into_body()).await
}

/// Insert a backup row directly with the given status (bypasses the API)
async fn insert_backup_with_status(pool: &SqlitePool, status: &str) -> i64 {
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO backup_records \
         (name, backup_type, format, modules, status, storage_location, \
          encrypted, compressed, verified, created_by, created_at, updated_at) \
         VALUES ('Seeded_Backup', 'selective', 'sql_dump', 'child_records', ?, 'local', \
          0, 0, 0, 'tester', ?, ?)",
    )
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

// =============================================================================
// Health & storage
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = create_test_app(&temp_dir).await;

    let response = app.oneshot(make_get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["database"], json!("connected"));
    assert_eq!(body["storage"], json!("connected"));
}

#[tokio::test]
async fn test_storage_status() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = create_test_app(&temp_dir).await;

    let response = app.oneshot(make_get_request("/api/storage")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["backend"], json!("local"));
    assert_eq!(body["connected"], json!(true));
    assert_eq!(body["authenticated"], json!(true));
    assert!(body["quota"]["total_bytes"].as_u64().unwrap() > 0);
}

// =============================================================================
// Backup creation
// =============================================================================

#[tokio::test]
async fn test_selective_backup_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["vaccine_management"], &[]).await;
    let record = fetch_backup(&app, backup_id).await;

    assert_eq!(record["type"], json!("selective"));
    assert_eq!(record["format"], json!("sql_dump"));
    assert_eq!(record["encrypted"], json!(false));
    assert_eq!(record["compressed"], json!(false));
    assert_eq!(record["status"], json!("completed"));
    assert_eq!(record["modules"], json!(["vaccine_management"]));
    assert_eq!(record["created_by"], json!("midwife-01"));
    assert!(record["remote_file_id"].is_string());
    assert!(record["file_size"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_full_backup_type_and_generated_name() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let all_modules = [
        "patient_records",
        "prenatal_monitoring",
        "child_records",
        "immunization_records",
        "vaccine_management",
    ];
    let (backup_id, _) = run_backup(&app, &all_modules, &["compress", "encrypt", "verify"]).await;
    let record = fetch_backup(&app, backup_id).await;

    assert_eq!(record["type"], json!("full"));
    assert!(record["name"].as_str().unwrap().starts_with("Full_Backup_"));
    assert_eq!(record["encrypted"], json!(true));
    assert_eq!(record["compressed"], json!(true));
    assert_eq!(record["verified"], json!(true));
    assert_eq!(record["status"], json!("completed"));
}

#[tokio::test]
async fn test_backup_validation_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = create_test_app(&temp_dir).await;

    // Empty module selection
    let response = app
        .clone()
        .oneshot(make_post_request("/api/backups", json!({ "modules": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Unknown module tag
    let response = app
        .clone()
        .oneshot(make_post_request(
            "/api/backups",
            json!({ "modules": ["billing_records"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Unknown option
    let response = app
        .oneshot(make_post_request(
            "/api/backups",
            json!({ "modules": ["child_records"], "options": ["shrink"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_estimate_size() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let response = app
        .oneshot(make_get_request(
            "/api/backups/estimate?modules=patient_records,child_records",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert!(body["estimated_mb"].as_f64().unwrap() >= 0.0);
}

// =============================================================================
// Restore preconditions
// =============================================================================

#[tokio::test]
async fn test_restore_requires_confirmation() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    let backup_id = insert_backup_with_status(&state.pool, "completed").await;

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({ "backup_id": backup_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_restore_of_incomplete_backup_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    let backup_id = insert_backup_with_status(&state.pool, "pending").await;

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({ "backup_id": backup_id, "confirm_restore": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Cannot restore from incomplete backup"));

    // No restore operation side effects
    let operations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restore_operations")
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert_eq!(operations, 0);
}

#[tokio::test]
async fn test_restore_of_unknown_backup_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _state) = create_test_app(&temp_dir).await;

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({ "backup_id": 999, "confirm_restore": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Full round-trip
// =============================================================================

#[tokio::test]
async fn test_full_backup_restore_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let all_modules = [
        "patient_records",
        "prenatal_monitoring",
        "child_records",
        "immunization_records",
        "vaccine_management",
    ];
    let (backup_id, _) = run_backup(&app, &all_modules, &["compress", "encrypt"]).await;

    // Wipe every module table
    for table in [
        "patients",
        "prenatal_visits",
        "children",
        "immunizations",
        "vaccines",
        "vaccine_stocks",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&state.pool)
            .await
            .unwrap();
        assert_eq!(table_count(&state.pool, table).await, 0);
    }

    let response = app
        .clone()
        .oneshot(make_post_request(
            "/api/restores",
            json!({ "backup_id": backup_id, "confirm_restore": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["message"],
        json!("Database restored successfully from full backup.")
    );

    // Original row counts reproduced
    assert_eq!(table_count(&state.pool, "patients").await, 2);
    assert_eq!(table_count(&state.pool, "prenatal_visits").await, 1);
    assert_eq!(table_count(&state.pool, "children").await, 1);
    assert_eq!(table_count(&state.pool, "immunizations").await, 1);
    assert_eq!(table_count(&state.pool, "vaccines").await, 2);
    assert_eq!(table_count(&state.pool, "vaccine_stocks").await, 1);

    // Progress endpoint reports terminal success
    let operation_id = body["operation_id"].as_i64().unwrap();
    let response = app
        .oneshot(make_get_request(&format!(
            "/api/restores/{}/progress",
            operation_id
        )))
        .await
        .unwrap();
    let progress = body_to_json(response.into_body()).await;
    assert_eq!(progress["status"], json!("completed"));
    assert_eq!(progress["progress"], json!(100));
    assert_eq!(progress["error"], json!(null));
}

#[tokio::test]
async fn test_selective_restore_preserves_other_modules() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["child_records"], &[]).await;

    // Data changes after the backup: children wiped, a new patient added
    sqlx::query("DELETE FROM children")
        .execute(&state.pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO patients (full_name) VALUES ('Post-Backup Patient')")
        .execute(&state.pool)
        .await
        .unwrap();
    let patients_before = table_count(&state.pool, "patients").await;
    assert_eq!(patients_before, 3);

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({
                "backup_id": backup_id,
                "restore_options": ["selective_restore"],
                "confirm_restore": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(true));
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Child Records"));
    assert!(message.contains("preserved"));

    // The selected module came back
    assert_eq!(table_count(&state.pool, "children").await, 1);
    // Unrelated tables were not touched by the restore
    assert_eq!(table_count(&state.pool, "patients").await, patients_before);
    assert_eq!(table_count(&state.pool, "vaccines").await, 2);
}

// =============================================================================
// Integrity verification
// =============================================================================

#[tokio::test]
async fn test_verify_endpoint_detects_tampering() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["patient_records"], &[]).await;

    // Untampered artifact verifies clean
    let response = app
        .clone()
        .oneshot(make_get_request(&format!("/api/backups/{}/verify", backup_id)))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["valid"], json!(true));

    // Corrupt the stored blob
    let record = fetch_backup(&app, backup_id).await;
    let file_id = record["remote_file_id"].as_str().unwrap();
    std::fs::write(state.config.storage_root.join(file_id), b"tampered").unwrap();

    let response = app
        .oneshot(make_get_request(&format!("/api/backups/{}/verify", backup_id)))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["valid"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("mismatch"));
}

#[tokio::test]
async fn test_restore_aborts_on_integrity_failure() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["patient_records"], &[]).await;
    let record = fetch_backup(&app, backup_id).await;
    let file_id = record["remote_file_id"].as_str().unwrap();
    std::fs::write(state.config.storage_root.join(file_id), b"tampered").unwrap();

    let patients_before = table_count(&state.pool, "patients").await;

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({
                "backup_id": backup_id,
                "restore_options": ["verify_integrity"],
                "confirm_restore": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(false));

    // The operation failed during verification and never reached the
    // "Restoring database..." step; no data was touched
    let operation_id = body["operation_id"].as_i64().unwrap();
    let (status, progress, step, error): (String, i64, String, Option<String>) =
        sqlx::query_as(
            "SELECT status, progress, current_step, error_message \
             FROM restore_operations WHERE id = ?",
        )
        .bind(operation_id)
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert_eq!(status, "failed");
    assert_eq!(progress, 0);
    assert_eq!(step, "Verifying backup integrity...");
    assert!(error.unwrap().contains("mismatch"));
    assert_eq!(table_count(&state.pool, "patients").await, patients_before);
}

// =============================================================================
// Pre-restore safety backup
// =============================================================================

#[tokio::test]
async fn test_restore_with_create_backup_adds_one_full_backup() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["vaccine_management"], &[]).await;

    let full_before: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM backup_records WHERE backup_type = 'full'",
    )
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(full_before, 0);

    let response = app
        .oneshot(make_post_request(
            "/api/restores",
            json!({
                "backup_id": backup_id,
                "restore_options": ["create_backup"],
                "confirm_restore": true
            }),
        ))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(true), "restore failed: {}", body);

    // Exactly one new full backup, sealed and verified
    let full_backups: Vec<(String, bool, bool, bool)> = sqlx::query_as(
        "SELECT status, encrypted, compressed, verified \
         FROM backup_records WHERE backup_type = 'full'",
    )
    .fetch_all(&state.pool)
    .await
    .unwrap();
    assert_eq!(full_backups.len(), 1);
    let (status, encrypted, compressed, verified) = &full_backups[0];
    assert_eq!(status, "completed");
    assert!(*encrypted);
    assert!(*compressed);
    assert!(*verified);
}

// =============================================================================
// History, deletion, progress
// =============================================================================

#[tokio::test]
async fn test_failed_backup_stays_visible_in_history() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (ok_id, _) = run_backup(&app, &["child_records"], &[]).await;
    let failed_id = insert_backup_with_status(&state.pool, "pending").await;
    sqlx::query(
        "UPDATE backup_records SET status = 'failed', error_message = 'Remote storage unreachable' \
         WHERE id = ?",
    )
    .bind(failed_id)
    .execute(&state.pool)
    .await
    .unwrap();

    let response = app.oneshot(make_get_request("/api/backups")).await.unwrap();
    let body = body_to_json(response.into_body()).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 2);
    let failed = records
        .iter()
        .find(|r| r["id"].as_i64() == Some(failed_id))
        .unwrap();
    assert_eq!(failed["status"], json!("failed"));
    assert_eq!(failed["error_message"], json!("Remote storage unreachable"));
    assert!(records.iter().any(|r| r["id"].as_i64() == Some(ok_id)));
}

#[tokio::test]
async fn test_delete_backup_removes_record_and_blob() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["patient_records"], &[]).await;
    let record = fetch_backup(&app, backup_id).await;
    let blob_path = state
        .config
        .storage_root
        .join(record["remote_file_id"].as_str().unwrap());
    assert!(blob_path.exists());

    let response = app
        .clone()
        .oneshot(make_delete_request(&format!("/api/backups/{}", backup_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!blob_path.exists());

    let response = app
        .oneshot(make_get_request(&format!("/api/backups/{}", backup_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restore_history_survives_backup_deletion() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["child_records"], &[]).await;
    let response = app
        .clone()
        .oneshot(make_post_request(
            "/api/restores",
            json!({ "backup_id": backup_id, "confirm_restore": true }),
        ))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], json!(true));

    // Delete the backup; its restore history must remain
    app.clone()
        .oneshot(make_delete_request(&format!("/api/backups/{}", backup_id)))
        .await
        .unwrap();

    let response = app.oneshot(make_get_request("/api/restores")).await.unwrap();
    let history = body_to_json(response.into_body()).await;
    let operations = history.as_array().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["backup_id"].as_i64(), Some(backup_id));
    assert_eq!(operations[0]["status"], json!("completed"));
}

#[tokio::test]
async fn test_backup_progress_poll() {
    let temp_dir = TempDir::new().unwrap();
    let (app, state) = create_test_app(&temp_dir).await;
    seed_health_data(&state.pool).await;

    let (backup_id, _) = run_backup(&app, &["vaccine_management"], &[]).await;
    let response = app
        .oneshot(make_get_request(&format!(
            "/api/backups/{}/progress",
            backup_id
        )))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(body["progress"], json!(100));
    assert_eq!(body["error"], json!(null));
}
