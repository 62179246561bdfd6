//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rule_sets: usize,
    pub catalog_documents: usize,
}

/// `GET /health`: liveness plus the size of the loaded reference data.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        rule_sets: ctx.engine.rule_set_count(),
        catalog_documents: ctx.engine.catalog_document_count(),
    })
}
