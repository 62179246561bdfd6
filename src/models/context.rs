use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::enums::VisaType;
use super::ModelError;

/// Country code used by the rule store and the fallback table.
///
/// ISO-like: 2-3 ASCII letters, stored upper-case. `XX` is reserved for
/// the generic-country entries of the static fallback table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CountryCode(String);

/// Country code of the generic fallback entries.
pub const GENERIC_COUNTRY: &str = "XX";

impl CountryCode {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        let valid_len = (2..=3).contains(&trimmed.len());
        if !valid_len || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ModelError::InvalidCountryCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn generic() -> Self {
        Self(GENERIC_COUNTRY.to_string())
    }

    pub fn is_generic(&self) -> bool {
        self.0 == GENERIC_COUNTRY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CountryCode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// What the Applicant Context Provider supplies for one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantContext {
    /// Free-form questionnaire answers, addressed by dotted paths in rule triggers.
    #[serde(default)]
    pub questionnaire_answers: serde_json::Map<String, serde_json::Value>,
    /// Computed risk score; `None` means no risk-based documents fire.
    #[serde(default)]
    pub risk_score: Option<f64>,
}

impl ApplicantContext {
    /// Resolve a dotted path (`travel.previousVisits`) inside the answers.
    pub fn answer(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.questionnaire_answers.get(first)?;
        for segment in segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Input of `generate_checklist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistRequest {
    pub country: CountryCode,
    pub visa_type: VisaType,
    #[serde(default)]
    pub applicant_context: ApplicantContext,
}

impl ChecklistRequest {
    pub fn new(country: CountryCode, visa_type: VisaType, applicant_context: ApplicantContext) -> Self {
        Self {
            country,
            visa_type,
            applicant_context,
        }
    }
}
