use crate::core::config::parse_http_url;
use crate::core::error::RelayError;
use crate::core::types::{AckResponse, ErrorResponse, Job, SendParams};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn index() -> &'static str {
    "page-relay is running. GET /send?url=<absolute-url> to extract a page."
}

/// `GET /send?url=...`: validate synchronously, acknowledge, run in the background.
/// Answers 503 when the job backlog is full.
pub async fn send(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SendParams>,
) -> Result<Json<AckResponse>, (StatusCode, Json<ErrorResponse>)> {
    let target = validate_target(params.url.as_deref()).map_err(|e| {
        warn!("rejected /send: {}", e);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let job = Job::new(target);
    let ack = AckResponse {
        status: "accepted".to_string(),
        job_id: job.id.clone(),
        url: job.target_url.to_string(),
    };
    // Not awaited: the response goes out now, the job reports out of band.
    let handle = state.dispatcher.dispatch(job).map_err(|e| {
        warn!("rejected /send for {}: {}", ack.url, e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;
    drop(handle);
    info!("📥 job {} accepted: {}", ack.job_id, ack.url);

    Ok(Json(ack))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "page-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "jobs": state.dispatcher.stats(),
        "memory": {
            "resident_bytes": resident_memory_bytes(),
        },
        "config": state.config.echo(),
    }))
}

pub fn validate_target(raw: Option<&str>) -> Result<url::Url, RelayError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RelayError::Validation("missing required query parameter 'url'".into()))?;
    parse_http_url(raw).map_err(|e| RelayError::Validation(format!("'url' {}", e)))
}

/// Resident set size of this process, if the platform reports it.
fn resident_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory())
}
