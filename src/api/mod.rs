//! HTTP API.
//!
//! ## Endpoints
//!
//! - `POST /v1/chat/completions` - Chat completion, streaming or not (auth)
//! - `GET /v1/models` - List models (auth)
//! - `GET /models` - List models
//! - `GET /debug?enable=true|false` - Toggle upstream chunk tracing

pub mod auth;
mod chat;
mod routes;

pub use auth::ClientKeySet;
pub use routes::{router, serve, AppState};
