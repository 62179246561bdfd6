//! Document checklist generation for visa applications.
//!
//! A rule set decides which documents an applicant needs whenever one
//! exists for the destination; the text-generation service only writes
//! the localized text and is validated against the rules. Without a rule
//! set the service decides the checklist itself. Every path ends in a
//! complete checklist, degrading to rule-based or static data when
//! generation fails.

pub mod api;
pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. `RUST_LOG` wins over
/// `CHECKLIST_LOG` and the built-in default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
