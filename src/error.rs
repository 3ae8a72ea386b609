//! Error taxonomy for the rewrite flow

use crate::types::{Phase, SectionKey};
use thiserror::Error;

/// Uploaded documents could not be read. Aborts the upload transition.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("no files were provided")]
    NoFiles,
    #[error("failed to read '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A generation call failed. Recovered locally through call fallbacks.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("oracle returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle returned no text")]
    EmptyResponse,
    #[error("failed to decode oracle response: {0}")]
    Decode(String),
    #[error("scripted failure: {0}")]
    Scripted(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A transition was requested that the current state does not allow
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("action requires phase {expected}, session is in {actual}")]
    WrongPhase { expected: Phase, actual: Phase },
    #[error("no section is active")]
    NoActiveSection,
    #[error("section cursor {index} is outside the catalog of {len} sections")]
    CursorOutOfRange { index: usize, len: usize },
    #[error("draft text is empty")]
    EmptyDraft,
    #[error("section '{0}' has not been reached yet")]
    SectionNotReached(SectionKey),
    #[error("section '{0}' is not part of this catalog")]
    UnknownSection(SectionKey),
    #[error("the current section must be polished before advancing")]
    NotInReview,
    #[error("no structure proposal to approve")]
    NoStructure,
    #[error("no conversation entry with id {0}")]
    UnknownEntry(uuid::Uuid),
}

impl InvariantViolation {
    /// Violations that mean the session itself is inconsistent, not that
    /// the caller asked for something out of turn
    pub fn is_corrupting(&self) -> bool {
        matches!(self, InvariantViolation::CursorOutOfRange { .. })
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build document archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to write document: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),
}

/// Error returned by orchestrator operations
#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("another action is still in progress")]
    Busy,
    #[error("session was restarted while the request was in flight")]
    Stale,
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Export(#[from] ExportError),
}
