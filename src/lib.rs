//! # yupp-bridge
//!
//! OpenAI-compatible gateway in front of the Yupp.ai chat aggregator.
//!
//! This library provides:
//! - An OpenAI-style HTTP surface (`/v1/chat/completions`, `/v1/models`)
//! - A rotating pool of upstream session accounts with cooldown-based failover
//! - A decoder for the upstream's `<hex-id>:<json>` line protocol that turns
//!   the user-selected branch into content / reasoning deltas
//!
//! ## Request Flow
//!
//! ```text
//!   client ──► api ──► gateway ──► account_pool (select)
//!                         │
//!                         ▼
//!                      upstream ──► line stream ──► decode ──► SSE frames
//!                                                     │
//!                                                     └──► assembler (non-stream)
//! ```
//!
//! ## Modules
//! - `account_pool`: credential selection and outcome accounting
//! - `decode`: chunk parsing, the branch-following decoder, response assembly
//! - `gateway`: per-request orchestration and failover loop
//! - `upstream`: reqwest client for the chat and reward-claim endpoints

pub mod account_pool;
pub mod api;
pub mod config;
pub mod decode;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod models;
pub mod openai;
pub mod upstream;

pub use account_pool::{AccountPool, PoolConfig};
pub use config::Config;
pub use error::GatewayError;
pub use gateway::{ChatReply, Gateway};
