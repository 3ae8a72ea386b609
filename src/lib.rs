//! Scribe - guided academic rewriting assistant
//!
//! Rewrites an uploaded draft section by section with a text oracle:
//! - Ingestion and per-section extraction of the author's original text
//! - Explicit rewrite state machine with a single in-flight action
//! - Durable single-slot session persistence
//! - Markdown, plain text and DOCX export

pub mod types;
pub mod error;
pub mod oracle;
pub mod http_oracle;
pub mod prompts;
pub mod calls;
pub mod ingestion;
pub mod machine;
pub mod orchestrator;
pub mod persistence;
pub mod export;
pub mod config;
pub mod server;

pub use types::*;
pub use error::{ExportError, IngestionError, InvariantViolation, OracleError, PersistenceError, ScribeError};
pub use oracle::{MockOracle, TextOracle};
pub use http_oracle::HttpOracle;
pub use orchestrator::{Orchestrator, SharedOrchestrator, UploadSummary};
pub use persistence::{JsonFileStore, MemoryStore, SessionRecord, SessionStore};
pub use export::{ExportFormat, ExportedDocument};
pub use config::ScribeConfig;
