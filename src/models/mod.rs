pub mod checklist;
pub mod context;
pub mod enums;

pub use checklist::*;
pub use context::*;
pub use enums::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid country code: {0:?} (expected 2-3 ASCII letters)")]
    InvalidCountryCode(String),
}
