//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use tracing::{error, info, warn};

use crate::{
    error::TimerError,
    state::{AppState, TimerRecord},
};
use super::responses::{
    ApiResponse, ExtendRequest, HealthResponse, StartRequest, StatusData,
};

/// Handle POST /timer/start - Start a timer, replacing any existing one
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Json<ApiResponse<TimerRecord>> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected start request: {}", rejection);
            return Json(ApiResponse::bad_request(rejection.body_text()));
        }
    };

    state.record_action("start");
    let result = state
        .engine
        .start(request.duration_seconds, &request.resource_id, request.category)
        .await;
    match &result {
        Ok(record) => info!("Start endpoint called - timer {} running", record.id),
        Err(e) => log_failure("start", e),
    }
    Json(ApiResponse::from_result(result))
}

/// Handle POST /timer/stop - Cancel the timer
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    state.record_action("stop");
    let result = state.engine.stop().await;
    if let Err(e) = &result {
        log_failure("stop", e);
    }
    Json(match result {
        Ok(()) => ApiResponse::ok(None),
        Err(e) => ApiResponse::from_result(Err(e)),
    })
}

/// Handle POST /timer/pause - Freeze the countdown
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse<TimerRecord>> {
    state.record_action("pause");
    let result = state.engine.pause().await;
    if let Err(e) = &result {
        log_failure("pause", e);
    }
    Json(ApiResponse::from_result(result))
}

/// Handle POST /timer/resume - Continue a paused countdown
pub async fn resume_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse<TimerRecord>> {
    state.record_action("resume");
    match state.engine.resume().await {
        Ok(record) => Json(ApiResponse::ok(record)),
        Err(e) => {
            log_failure("resume", &e);
            Json(ApiResponse::from_result(Err(e)))
        }
    }
}

/// Handle POST /timer/extend - Push the deadline later
pub async fn extend_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExtendRequest>, JsonRejection>,
) -> Json<ApiResponse<TimerRecord>> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected extend request: {}", rejection);
            return Json(ApiResponse::bad_request(rejection.body_text()));
        }
    };

    state.record_action("extend");
    let result = state.engine.extend(request.additional_seconds).await;
    if let Err(e) = &result {
        log_failure("extend", e);
    }
    Json(ApiResponse::from_result(result))
}

/// Handle GET /timer/status - Storage-backed timer snapshot and server info
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatusData>> {
    let timer = state.engine.status().await;
    let last_run = state.engine.last_run().await;
    let (last_action, last_action_time) = state.get_last_action();

    Json(ApiResponse::ok(Some(StatusData {
        timer,
        last_run,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

fn log_failure(action: &str, e: &TimerError) {
    match e {
        TimerError::StoreUnavailable(_) | TimerError::ActionPortFailure(_) => {
            error!("Failed to {} timer: {}", action, e)
        }
        _ => warn!("Failed to {} timer: {}", action, e),
    }
}
