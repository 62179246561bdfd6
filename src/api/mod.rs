//! HTTP surface for the checklist engine.
//!
//! `GET /health`, `POST /api/checklist` and `GET /api/checklist/mode`.
//! The engine is synchronous and runs on the blocking pool.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
