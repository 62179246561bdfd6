//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::models::{ApplicantContext, ChecklistMode, ChecklistRequest, CountryCode, ModelError, VisaType};
use crate::pipeline::checklist::ChecklistEngine;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<ChecklistEngine>,
}

impl ApiContext {
    pub fn new(engine: Arc<ChecklistEngine>) -> Self {
        Self { engine }
    }
}

/// `POST /api/checklist` body. Country and visa type arrive as plain
/// strings so that bad values map to a 400 with a readable message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistRequestBody {
    pub country: String,
    pub visa_type: String,
    #[serde(default)]
    pub applicant_context: ApplicantContext,
}

impl ChecklistRequestBody {
    pub fn into_request(self) -> Result<ChecklistRequest, ApiError> {
        let (country, visa_type) = parse_pair(&self.country, &self.visa_type)?;
        Ok(ChecklistRequest::new(country, visa_type, self.applicant_context))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeQuery {
    pub country: String,
    pub visa_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    pub mode: ChecklistMode,
}

pub(crate) fn parse_pair(country: &str, visa_type: &str) -> Result<(CountryCode, VisaType), ApiError> {
    let country = CountryCode::parse(country)?;
    let visa_type = VisaType::parse_lenient(visa_type).ok_or_else(|| ModelError::InvalidEnum {
        field: "visaType".into(),
        value: visa_type.to_string(),
    })?;
    Ok((country, visa_type))
}
