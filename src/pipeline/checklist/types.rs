use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::rules::RuleSet;
use super::{ExtractionFailure, GenerationFailure};
use crate::models::{
    CountryCode, DocumentCategory, DocumentText, Locale, Priority, TokenUsage, Translations,
    VisaType,
};

/// One call to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Successful reply from the text-generation service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

impl GenerationResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// The service stopped because it ran out of tokens.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Text-generation service abstraction (allows mocking).
pub trait GenerationClient: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationFailure>;
}

/// Read-only access to the per-(country, visa type) rule definitions.
pub trait RuleSetStore: Send + Sync {
    fn rule_set(&self, country: &CountryCode, visa_type: VisaType) -> Option<&RuleSet>;

    fn rule_set_count(&self) -> usize;
}

/// Read-only access to default document text.
pub trait DocumentCatalog: Send + Sync {
    fn default_text(&self, document_id: &str, locale: Locale) -> Option<DocumentText>;

    fn document_count(&self) -> usize;
}

/// One item as the service produced it. Untrusted: category and priority
/// are kept raw until validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedItem {
    pub document_id: String,
    pub category: Option<String>,
    pub required: Option<bool>,
    pub priority: Option<String>,
    pub texts: Translations,
}

impl GeneratedItem {
    pub fn parsed_category(&self) -> Option<DocumentCategory> {
        self.category.as_deref().and_then(DocumentCategory::parse_lenient)
    }

    pub fn parsed_priority(&self) -> Option<Priority> {
        self.priority.as_deref().and_then(Priority::parse_lenient)
    }

    /// `required` as stated, or as implied by the category when omitted.
    pub fn effective_required(&self) -> Option<bool> {
        self.required
            .or_else(|| self.parsed_category().map(|c| c.implies_required()))
    }
}

/// Parsed output of one generation attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedChecklist {
    pub items: Vec<GeneratedItem>,
    pub notes: Vec<String>,
}

impl GeneratedChecklist {
    pub fn ids(&self) -> BTreeSet<String> {
        self.items.iter().map(|i| i.document_id.clone()).collect()
    }

    /// First item with the given id.
    pub fn get(&self, document_id: &str) -> Option<&GeneratedItem> {
        self.items.iter().find(|i| i.document_id == document_id)
    }
}

/// A canonical structural field the generated item got wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    pub document_id: String,
    pub field: String,
    pub expected: String,
    pub found: String,
}

/// Outcome of validating one attempt. Built fresh per attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub missing_ids: BTreeSet<String>,
    pub extra_ids: BTreeSet<String>,
    pub field_mismatches: Vec<FieldMismatch>,
    pub duplicate_ids: BTreeSet<String>,
    /// Structural problems found by legacy validation.
    pub issues: Vec<String>,
}

/// Record of one generation attempt, discarded with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub index: u8,
    pub raw_text: Option<String>,
    pub generation_error: Option<GenerationFailure>,
    pub extraction_error: Option<ExtractionFailure>,
    pub generated: Option<GeneratedChecklist>,
}

impl Attempt {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            raw_text: None,
            generation_error: None,
            extraction_error: None,
            generated: None,
        }
    }
}

/// Cooperative cancellation shared between a request and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
