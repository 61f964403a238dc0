//! # NexMind Analysis Agent
//!
//! An AI-powered company analysis service that turns natural-language
//! queries into structured analysis reports through a staged pipeline:
//! plan derivation, concurrent web search, six-facet analysis synthesis,
//! and narrative report composition.
//!
//! ## Features
//!
//! - **Staged Pipeline**: plan → search → analyze → report, with every
//!   stage degrading to a documented default instead of failing
//! - **Concurrent Search**: up to four provider queries at a time, each
//!   with its own timeout and isolated failure handling
//! - **Facet Analysis**: six independently derived analysis dimensions
//!   (overview, financials, industry, competition, risk, recommendation)
//! - **Report Composition**: templated sections with per-facet fallbacks
//!   and an optional narrative rewrite pass
//! - **Conversation History**: bounded per-conversation message log with
//!   report export
//!
//! ## Architecture
//!
//! ```text
//! Client → Stdio Server (JSON-RPC) → Pipeline → Chat backend (HTTP)
//!                  ↓                     ↓
//!          Conversation Store     Search provider (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nexmind_agent::{AppState, Config, StdioServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::new(config)?);
//!     let server = StdioServer::new(state);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Analysis synthesis across the six company facets.
pub mod analysis;
/// Configuration management for the service.
pub mod config;
/// Conversation-scoped message history.
pub mod conversation;
/// Error types and result aliases for the application.
pub mod error;
/// Structured-record extraction from model output.
pub mod extract;
/// Chat-completion backend client and types.
pub mod llm;
/// The staged query pipeline.
pub mod pipeline;
/// Prompt and instruction text for the chat backend.
pub mod prompts;
/// Report composition from analysis facets.
pub mod report;
/// Web-search aggregation across providers.
pub mod search;
/// Service layer and stdio protocol surface.
pub mod server;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::stdio::StdioServer;
pub use server::{AppState, SharedState};
