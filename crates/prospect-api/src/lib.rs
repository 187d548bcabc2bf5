//! Prospect API crate - axum HTTP server for roleplay calls.
//!
//! Streams prospect replies over SSE, exposes call state, and offers the
//! prompt compiler and reply linter as debugging endpoints.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use sse::StreamEvent;
pub use state::AppState;
