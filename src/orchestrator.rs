//! Rewrite orchestrator: drives the state machine against the oracle

use crate::calls;
use crate::error::{InvariantViolation, ScribeError};
use crate::export::{self, ExportFormat, ExportedDocument};
use crate::ingestion::{self, SourceFile};
use crate::machine::{self, Advance, Approval, Ingestion, PolishOutcome, Ticket};
use crate::oracle::TextOracle;
use crate::persistence::{MemoryStore, SessionRecord, SessionStore};
use crate::types::{Catalog, ChatEntry, Phase, SectionKey, SessionState};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Main orchestrator (thread-safe via Arc)
pub struct Orchestrator {
    oracle: Arc<dyn TextOracle>,
    store: Arc<dyn SessionStore>,
    catalog: Catalog,
    propose_structure: bool,
    state: Mutex<SessionState>,
}

pub type SharedOrchestrator = Arc<Orchestrator>;

/// Summary of one ingestion batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    pub phase: Phase,
    pub sections_found: usize,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn TextOracle>,
        store: Arc<dyn SessionStore>,
        catalog: Catalog,
        propose_structure: bool,
    ) -> SharedOrchestrator {
        Arc::new(Self {
            oracle,
            store,
            catalog,
            propose_structure,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Guided flow over the academic catalog with an in-memory session slot
    pub fn new_simple(oracle: Arc<dyn TextOracle>) -> SharedOrchestrator {
        Self::new(oracle, Arc::new(MemoryStore::new()), Catalog::academic(), false)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Copy of the current session
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Route an invariant violation: corrupting ones reset the session
    fn violation(&self, state: &mut SessionState, v: InvariantViolation) -> ScribeError {
        if v.is_corrupting() {
            machine::recover(state, &v);
        } else {
            state.last_error = Some(v.to_string());
        }
        ScribeError::Invariant(v)
    }

    /// Re-acquire the session after an oracle call; `None` when stale
    async fn reacquire(&self, ticket: &Ticket) -> Option<tokio::sync::MutexGuard<'_, SessionState>> {
        let state = self.state.lock().await;
        if machine::is_current(&state, ticket) {
            Some(state)
        } else {
            warn!(
                "Discarding result from generation {} (session now at {})",
                ticket.generation, state.generation
            );
            None
        }
    }

    /// Ingest a batch of files
    pub async fn upload_files(&self, files: Vec<SourceFile>) -> Result<UploadSummary, ScribeError> {
        info!("Upload requested: {} file(s)", files.len());

        // Step 0: Admit and enter PROCESSING
        let (ticket, prior, existing_source) = {
            let mut state = self.state.lock().await;
            let ticket = machine::begin(&mut state)?;
            match machine::enter_processing(&mut state) {
                Ok(prior) => (ticket, prior, state.combined_source_text.clone()),
                Err(v) => {
                    machine::release(&mut state, &ticket);
                    return Err(self.violation(&mut state, v));
                }
            }
        };

        // Step 1: Read every file concurrently (all-or-nothing)
        let docs = match ingestion::read_batch(&files).await {
            Ok(docs) => docs,
            Err(e) => {
                error!("Ingestion failed: {}", e);
                if let Some(mut state) = self.reacquire(&ticket).await {
                    machine::revert_upload(&mut state, prior, &e.to_string());
                    machine::release(&mut state, &ticket);
                }
                return Err(e.into());
            }
        };

        // Step 2: Merge and extract section originals, in catalog order
        let combined = ingestion::merge_sources(&existing_source, &docs);
        let extracted = ingestion::extract_sections(self.oracle.as_ref(), &self.catalog, &combined).await;
        let sections_found = extracted.iter().filter(|(_, e)| !e.text().is_empty()).count();

        // Step 3: Outline variant proposes a structure on first ingestion
        let structure = if self.propose_structure && prior == Phase::WaitingForUpload {
            Some(
                calls::propose_structure(self.oracle.as_ref(), &combined, None)
                    .await
                    .map_err(|e| e.to_string()),
            )
        } else {
            None
        };

        // Step 4: Commit
        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        let ingested = Ingestion {
            file_names: docs.into_iter().map(|(name, _)| name).collect(),
            combined_source_text: combined,
            extracted,
            structure,
        };
        let files = ingested.file_names.len();
        machine::apply_ingestion(&mut state, &self.catalog, prior, ingested, self.propose_structure);
        machine::release(&mut state, &ticket);

        info!(
            "Upload complete: {} file(s), {} section(s) with original text, phase {}",
            files, sections_found, state.phase
        );
        Ok(UploadSummary {
            files,
            phase: state.phase,
            sections_found,
        })
    }

    /// Ask for a new structure proposal, optionally guided by feedback
    pub async fn regenerate_structure(&self, feedback: Option<String>) -> Result<String, ScribeError> {
        let (ticket, source) = {
            let mut state = self.state.lock().await;
            machine::ensure_idle(&state)?;
            let source = match machine::structure_request(&state) {
                Ok(source) => source,
                Err(v) => return Err(self.violation(&mut state, v)),
            };
            (machine::begin(&mut state)?, source)
        };

        let result = calls::propose_structure(self.oracle.as_ref(), &source, feedback.as_deref()).await;

        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        machine::release(&mut state, &ticket);
        match result {
            Ok(proposal) => {
                machine::apply_structure(&mut state, proposal.clone(), feedback.as_deref());
                info!("Structure regenerated ({} chars)", proposal.len());
                Ok(proposal)
            }
            Err(e) => {
                warn!("Structure regeneration failed: {}", e);
                state.last_error = Some(e.to_string());
                state.log(ChatEntry::system(format!(
                    "A new structure could not be generated ({}). The previous proposal was kept.",
                    e
                )));
                Err(e.into())
            }
        }
    }

    /// Freeze the structure and begin rewriting
    pub async fn approve_structure(&self) -> Result<(), ScribeError> {
        let (ticket, source, structure) = {
            let mut state = self.state.lock().await;
            machine::ensure_idle(&state)?;
            let (source, structure) = match machine::approve_structure(&mut state, &self.catalog) {
                Ok(inputs) => inputs,
                Err(v) => return Err(self.violation(&mut state, v)),
            };
            (machine::begin(&mut state)?, source, structure)
        };
        info!("Structure approved");

        let question = calls::initial_question(self.oracle.as_ref(), &source, &structure).await;

        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        machine::apply_initial_question(&mut state, question);
        machine::release(&mut state, &ticket);
        Ok(())
    }

    pub async fn set_draft_text(&self, text: &str) -> Result<(), ScribeError> {
        let mut state = self.state.lock().await;
        machine::ensure_idle(&state)?;
        machine::set_draft(&mut state, &self.catalog, text).map_err(|v| self.violation(&mut state, v))
    }

    /// Polish the current draft and gather suggestions; returns the polished text
    pub async fn polish(&self) -> Result<String, ScribeError> {
        let (ticket, req) = {
            let mut state = self.state.lock().await;
            machine::ensure_idle(&state)?;
            let req = match machine::polish_request(&state, &self.catalog) {
                Ok(req) => req,
                Err(v) => return Err(self.violation(&mut state, v)),
            };
            (machine::begin(&mut state)?, req)
        };
        info!("Polishing section '{}' ({} chars of draft)", req.key, req.draft.len());

        let (reply, from_oracle) =
            calls::polish_section(self.oracle.as_ref(), &req.original, &req.draft, &req.title).await;
        let suggestions =
            calls::improvement_suggestions(self.oracle.as_ref(), &req.original, &reply.primary).await;

        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        machine::release(&mut state, &ticket);
        let polished = reply.primary.clone();
        let outcome = PolishOutcome {
            polished: reply.primary,
            followup: reply.followup,
            suggestions,
            from_oracle,
        };
        machine::apply_polish(&mut state, &req, outcome).map_err(|v| self.violation(&mut state, v))?;
        Ok(polished)
    }

    /// Accept the current section and move on
    pub async fn advance(&self) -> Result<Advance, ScribeError> {
        let (ticket, step) = {
            let mut state = self.state.lock().await;
            machine::ensure_idle(&state)?;
            let step = match machine::advance(&mut state, &self.catalog) {
                Ok(step) => step,
                Err(v) => return Err(self.violation(&mut state, v)),
            };
            let ticket = if matches!(step, Advance::NeedsReferences { .. }) {
                Some(machine::begin(&mut state)?)
            } else {
                None
            };
            (ticket, step)
        };

        let (ticket, article) = match (ticket, step) {
            (Some(ticket), Advance::NeedsReferences { article }) => (ticket, article),
            (_, step) => return Ok(step),
        };

        info!("References section reached; generating from {} chars", article.len());
        let references = calls::generate_references(self.oracle.as_ref(), &article).await;

        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        machine::release(&mut state, &ticket);
        machine::apply_references(&mut state, &self.catalog, references)
            .map_err(|v| self.violation(&mut state, v))?;
        Ok(Advance::Complete)
    }

    /// Directly edit rewritten text, bypassing the oracle
    pub async fn edit_article_section(&self, key: SectionKey, text: &str) -> Result<(), ScribeError> {
        let mut state = self.state.lock().await;
        machine::ensure_idle(&state)?;
        machine::edit_section(&mut state, &self.catalog, key, text)
            .map_err(|v| self.violation(&mut state, v))
    }

    /// Free-form chat turn; returns the id of the entry carrying the suggestion
    pub async fn compose(&self, message: &str) -> Result<Uuid, ScribeError> {
        let (ticket, req) = {
            let mut state = self.state.lock().await;
            machine::ensure_idle(&state)?;
            let req = match machine::compose_request(&state, &self.catalog, message) {
                Ok(req) => req,
                Err(v) => return Err(self.violation(&mut state, v)),
            };
            (machine::begin(&mut state)?, req)
        };

        let reply = calls::compose_passage(
            self.oracle.as_ref(),
            &req.message,
            &req.source,
            &req.current,
            req.structure.as_deref(),
        )
        .await;
        let followup = reply.followup_or(crate::prompts::FOLLOWUP_FALLBACK);

        let mut state = self.reacquire(&ticket).await.ok_or(ScribeError::Stale)?;
        machine::release(&mut state, &ticket);
        machine::apply_compose(&mut state, &req, reply.primary, followup)
            .map_err(|v| self.violation(&mut state, v))
    }

    pub async fn approve_suggestion(&self, entry_id: Uuid) -> Result<Approval, ScribeError> {
        let mut state = self.state.lock().await;
        machine::ensure_idle(&state)?;
        machine::approve_suggestion(&mut state, &self.catalog, entry_id)
            .map_err(|v| self.violation(&mut state, v))
    }

    /// Persist the session. Failures are reported but in-memory work continues.
    pub async fn save(&self) -> Result<(), ScribeError> {
        let mut state = self.state.lock().await;
        machine::ensure_idle(&state)?;
        let record = SessionRecord::capture(&state);
        match self.store.save(&record) {
            Ok(()) => {
                info!("Session saved ({} log entries)", record.conversation_log.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to save session: {}", e);
                state.last_error = Some(e.to_string());
                state.log(ChatEntry::system(format!("Progress could not be saved: {}", e)));
                Err(e.into())
            }
        }
    }

    /// Load the persisted session, if any; returns whether one was found
    pub async fn resume(&self) -> Result<bool, ScribeError> {
        let mut state = self.state.lock().await;
        machine::ensure_idle(&state)?;
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(false),
            Err(e) => {
                error!("Failed to load session: {}", e);
                state.last_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        record.restore_into(&mut state);
        if let Err(violation) = machine::check_restored(&state, &self.catalog) {
            machine::recover(&mut state, &violation);
            return Ok(false);
        }
        if !state.conversation_log.is_empty() {
            state.log(ChatEntry::system("Session restored."));
        }
        info!(
            "Session restored: phase {}, section {}",
            state.phase, state.current_section_index
        );
        Ok(true)
    }

    /// Clear everything, including the persisted slot. Always allowed.
    pub async fn restart(&self) -> Result<(), ScribeError> {
        let mut state = self.state.lock().await;
        machine::restart(&mut state);
        if let Err(e) = self.store.clear() {
            error!("Failed to clear saved session: {}", e);
            state.last_error = Some(e.to_string());
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn export(&self, format: ExportFormat) -> Result<ExportedDocument, ScribeError> {
        let state = self.state.lock().await;
        let doc = export::export_article(&state.article, &self.catalog, format, &state.file_names)?;
        info!("Exported {} ({} bytes)", doc.file_name, doc.bytes.len());
        Ok(doc)
    }
}
