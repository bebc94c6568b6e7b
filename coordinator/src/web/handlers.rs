// File: coordinator/src/web/handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::retirement_ledger::LedgerEntry;
use crate::stages::{InvocationResponse, Stage};
use crate::web::AppState;

pub type InvokeResult = Result<Json<InvocationResponse>, (StatusCode, Json<InvocationResponse>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn failure(status: StatusCode, body: String) -> (StatusCode, Json<InvocationResponse>) {
    (
        status,
        Json(InvocationResponse {
            status_code: status.as_u16(),
            body,
        }),
    )
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Run one stage once, the way a scheduled tick would but without trigger gating
pub async fn invoke_stage(
    State(state): State<AppState>,
    Path(stage_name): Path<String>,
) -> InvokeResult {
    let stage: Stage = stage_name
        .parse()
        .map_err(|e: String| failure(StatusCode::NOT_FOUND, e))?;

    info!("Manual invocation of {}", stage);
    match state.runner.invoke(stage).await {
        Ok(report) => Ok(Json(InvocationResponse::from(&report))),
        Err(e) => {
            error!("{} invocation failed: {}", stage, e);
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Current retirement ledger, most recently changed first
pub async fn get_ledger(State(state): State<AppState>) -> Json<ApiResponse<Vec<LedgerEntry>>> {
    let mut entries = state.runner.context().ledger.entries().await;
    entries.sort_by(|a, b| b.entered_at.cmp(&a.entered_at));
    Json(ApiResponse::success(entries))
}
