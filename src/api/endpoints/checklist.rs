//! Checklist generation and mode lookup.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{parse_pair, ApiContext, ChecklistRequestBody, ModeQuery, ModeResponse};
use crate::models::FinalChecklist;
use crate::pipeline::checklist::CancelFlag;

/// Raises the flag if the handler future is dropped before completion,
/// which is how axum reports a client disconnect.
struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    fn new(flag: CancelFlag) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::info!("Client went away, cancelling checklist generation");
            self.flag.cancel();
        }
    }
}

/// `POST /api/checklist`
pub async fn generate(
    State(ctx): State<ApiContext>,
    body: Result<Json<ChecklistRequestBody>, JsonRejection>,
) -> Result<Json<FinalChecklist>, ApiError> {
    let Json(body) = body?;
    let request = body.into_request()?;

    let cancel = CancelFlag::new();
    let guard = CancelOnDrop::new(cancel.clone());
    let engine = ctx.engine.clone();
    let checklist = tokio::task::spawn_blocking(move || {
        engine.generate_checklist_with_cancel(&request, &cancel)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("checklist task failed: {e}")))?;
    guard.disarm();

    Ok(Json(checklist))
}

/// `GET /api/checklist/mode?country=..&visaType=..`
pub async fn mode(
    State(ctx): State<ApiContext>,
    query: Result<Query<ModeQuery>, QueryRejection>,
) -> Result<Json<ModeResponse>, ApiError> {
    let Query(query) = query?;
    let (country, visa_type) = parse_pair(&query.country, &query.visa_type)?;
    Ok(Json(ModeResponse {
        mode: ctx.engine.mode_for(&country, visa_type),
    }))
}
