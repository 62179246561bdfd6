pub mod assets;
pub mod catalog;
pub mod correction;
pub mod fallback;
pub mod model_resolver;
pub mod openai;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod rules;
pub mod sanitize;
pub mod types;
pub mod validation;

pub use assets::*;
pub use catalog::*;
pub use correction::*;
pub use fallback::*;
pub use model_resolver::*;
pub use openai::*;
pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;
pub use rules::*;
pub use sanitize::*;
pub use types::*;
pub use validation::*;

use thiserror::Error;

/// Failure of one call to the text-generation service. Always recovered by
/// the attempt controller; never surfaced past the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("Generation timed out after {0} ms")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generation service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Generation client is not configured: {0}")]
    Unconfigured(String),

    #[error("Generation cancelled by caller")]
    Cancelled,
}

impl GenerationFailure {
    /// Worth another attempt. Configuration and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Transport(_) | Self::Status { .. } | Self::MalformedEnvelope(_)
        )
    }
}

/// Why no checklist could be recovered from generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    EmptyResponse,
    NoJsonFound,
    Unbalanced,
    InvalidJson,
    UnexpectedShape,
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::NoJsonFound => write!(f, "no JSON payload found"),
            Self::Unbalanced => write!(f, "unbalanced JSON payload"),
            Self::InvalidJson => write!(f, "invalid JSON"),
            Self::UnexpectedShape => write!(f, "JSON does not describe a checklist"),
        }
    }
}

/// Tagged extraction failure. The raw text is retained for diagnostics
/// and must only be logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Extraction failed: {kind}")]
pub struct ExtractionFailure {
    pub kind: ExtractionErrorKind,
    pub raw_text: String,
}

impl ExtractionFailure {
    pub fn new(kind: ExtractionErrorKind, raw_text: &str) -> Self {
        Self {
            kind,
            raw_text: raw_text.to_string(),
        }
    }
}

/// Errors while loading the catalog, rule sets or fallback table.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid rule set for {country}/{visa_type}: {reason}")]
    InvalidRuleSet {
        country: String,
        visa_type: String,
        reason: String,
    },

    #[error("Static fallback table has no usable generic entry for visa type {0}")]
    MissingGenericEntry(String),

    #[error("Invalid country code in {name}: {value}")]
    InvalidCountryCode { name: String, value: String },
}
