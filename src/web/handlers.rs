//! HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, error, warn};

use crate::engine::{EngineStats, KvEngine};
use crate::store::ShardStats;

/// Shared application state
pub type AppState = Arc<KvEngine>;

#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct PrefixResponse {
    pub prefix: String,
    pub values: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Engine and system statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub engine: EngineStats,
    pub shards: Vec<ShardStats>,
    /// Total system memory in MB
    pub total_memory_mb: f64,
    /// Used system memory in MB
    pub used_memory_mb: f64,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// `GET /kv/:key`
pub async fn get_handler(State(engine): State<AppState>, Path(key): Path<String>) -> Response {
    match engine.get(&key) {
        Some(value) => (StatusCode::OK, Json(GetResponse { key, value })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("key '{}' not found", key)),
    }
}

/// `PUT /kv/:key` with the raw value as body
pub async fn set_handler(
    State(engine): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    use base64::{engine::general_purpose, Engine as _};

    let value = match String::from_utf8(body.to_vec()) {
        Ok(v) => v,
        Err(_) => {
            let b64 = general_purpose::STANDARD.encode(&body);
            warn!("Rejected non UTF-8 value for key '{}'. Raw bytes (B64): {}", key, b64);
            return error_response(StatusCode::BAD_REQUEST, "value must be valid UTF-8");
        }
    };

    // The WAL append syncs to disk
    let result = tokio::task::spawn_blocking(move || engine.set(key, value)).await;

    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            error!("Set failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!("Set task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// `GET /prefix/:prefix`
pub async fn prefix_handler(State(engine): State<AppState>, Path(prefix): Path<String>) -> Response {
    match engine.get_prefix(&prefix) {
        Ok(values) => (StatusCode::OK, Json(PrefixResponse { prefix, values })).into_response(),
        Err(e) if e.is_not_found() => {
            debug!("Get prefix: {} (none)", prefix);
            error_response(StatusCode::NOT_FOUND, e)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `POST /admin/snapshot`
pub async fn snapshot_handler(State(engine): State<AppState>) -> Response {
    match tokio::task::spawn_blocking(move || engine.snapshot()).await {
        Ok(Ok(timestamp)) => (StatusCode::OK, Json(SnapshotResponse { timestamp })).into_response(),
        Ok(Err(e)) => {
            error!("Snapshot failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!("Snapshot task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// `GET /stats`
pub async fn stats_handler(State(engine): State<AppState>) -> impl IntoResponse {
    let mut sys = System::new();
    sys.refresh_memory();

    let total_mem_bytes = sys.total_memory();
    let used_mem_bytes = total_mem_bytes.saturating_sub(sys.available_memory());

    let stats = StatsResponse {
        engine: engine.stats(),
        shards: engine.shard_stats(),
        total_memory_mb: total_mem_bytes as f64 / 1024.0 / 1024.0,
        used_memory_mb: used_mem_bytes as f64 / 1024.0 / 1024.0,
    };

    (StatusCode::OK, Json(stats))
}
