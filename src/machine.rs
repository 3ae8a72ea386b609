//! Section-by-section rewrite state machine.
//!
//! Pure, synchronous transitions over an explicit [`SessionState`]. The
//! orchestrator captures inputs with the `*_request` functions, runs the
//! oracle without holding the session, and commits results with the
//! `apply_*` functions. A [`Ticket`] ties every commit to the session
//! generation it was issued for, so results from before a restart are
//! dropped.

use crate::calls::SectionExtraction;
use crate::error::{InvariantViolation, ScribeError};
use crate::prompts;
use crate::types::{Catalog, ChatEntry, Phase, Section, SectionKey, SessionState};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Proof that an action was admitted by the `is_loading` gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
}

/// Admit an action: reject while another one is in flight
pub fn begin(state: &mut SessionState) -> Result<Ticket, ScribeError> {
    if state.is_loading {
        return Err(ScribeError::Busy);
    }
    state.is_loading = true;
    state.last_error = None;
    Ok(Ticket {
        generation: state.generation,
    })
}

/// True while no restart happened since the ticket was issued
pub fn is_current(state: &SessionState, ticket: &Ticket) -> bool {
    state.generation == ticket.generation
}

/// Clear the loading flag, unless a restart already handed the session on
pub fn release(state: &mut SessionState, ticket: &Ticket) {
    if is_current(state, ticket) {
        state.is_loading = false;
    }
}

/// Reject synchronous actions while an asynchronous one is in flight
pub fn ensure_idle(state: &SessionState) -> Result<(), ScribeError> {
    if state.is_loading {
        Err(ScribeError::Busy)
    } else {
        Ok(())
    }
}

fn require_phase(state: &SessionState, expected: Phase) -> Result<(), InvariantViolation> {
    if state.phase == expected {
        Ok(())
    } else {
        Err(InvariantViolation::WrongPhase {
            expected,
            actual: state.phase,
        })
    }
}

/// The section under the cursor while rewriting
pub fn current_section<'a>(
    state: &SessionState,
    catalog: &'a Catalog,
) -> Result<&'a Section, InvariantViolation> {
    require_phase(state, Phase::Rewriting)?;
    let section = catalog
        .get(state.current_section_index)
        .ok_or(InvariantViolation::CursorOutOfRange {
            index: state.current_section_index,
            len: catalog.len(),
        })?;
    if section.key.is_references() {
        return Err(InvariantViolation::NoActiveSection);
    }
    Ok(section)
}

/// Reset a session whose cursor or phase no longer make sense
pub fn recover(state: &mut SessionState, violation: &InvariantViolation) {
    warn!("Session inconsistent ({}); resetting to upload", violation);
    restart(state);
    state.last_error = Some(violation.to_string());
    state.log(ChatEntry::system(
        "The session reached an inconsistent state and was reset. Please upload your documents again.",
    ));
}

/// Reject restored sessions no sequence of transitions could have saved:
/// mid-upload, in review outside REWRITING, or a rewriting cursor that is
/// not on an authored section
pub fn check_restored(state: &SessionState, catalog: &Catalog) -> Result<(), InvariantViolation> {
    if state.phase == Phase::Processing {
        return Err(InvariantViolation::WrongPhase {
            expected: Phase::WaitingForUpload,
            actual: Phase::Processing,
        });
    }
    if state.in_review && state.phase != Phase::Rewriting {
        return Err(InvariantViolation::WrongPhase {
            expected: Phase::Rewriting,
            actual: state.phase,
        });
    }
    if state.phase == Phase::Rewriting {
        current_section(state, catalog)?;
    }
    Ok(())
}

/// Clear everything and return to the upload phase
pub fn restart(state: &mut SessionState) {
    let generation = state.generation + 1;
    *state = SessionState::default();
    state.generation = generation;
    info!("Session restarted (generation {})", generation);
}

fn prompt_section(state: &mut SessionState, section: &Section) {
    state.log(ChatEntry::bot(format!("{}\n\n{}", section.title, section.question)));
    let original = state.original.get(section.key);
    if !original.is_empty() {
        let msg = format!("Here is what I found in your document for this section:\n\n{}", original);
        state.log(ChatEntry::bot(msg));
    }
}

/// Move the cursor onto `index` in the rewriting phase with a fresh draft
fn enter_section(state: &mut SessionState, catalog: &Catalog, index: usize) {
    state.phase = Phase::Rewriting;
    state.current_section_index = index;
    state.in_review = false;
    if let Some(section) = catalog.get(index) {
        state.draft.set(section.key, "");
        prompt_section(state, section);
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Enter PROCESSING; returns the phase to fall back to
pub fn enter_processing(state: &mut SessionState) -> Result<Phase, InvariantViolation> {
    let prior = state.phase;
    if prior == Phase::Processing {
        return Err(InvariantViolation::WrongPhase {
            expected: Phase::WaitingForUpload,
            actual: prior,
        });
    }
    state.phase = Phase::Processing;
    Ok(prior)
}

/// Abort an upload: restore the prior phase and surface the error
pub fn revert_upload(state: &mut SessionState, prior: Phase, error: &str) {
    state.phase = prior;
    state.last_error = Some(error.to_string());
    state.log(ChatEntry::system(format!(
        "The documents could not be processed: {}",
        error
    )));
}

/// Output of the ingestion adapter for one batch
#[derive(Debug, Clone, Default)]
pub struct Ingestion {
    pub file_names: Vec<String>,
    pub combined_source_text: String,
    pub extracted: Vec<(SectionKey, SectionExtraction)>,
    /// Structure proposal, requested only on first ingestion of the outline variant
    pub structure: Option<Result<String, String>>,
}

/// Commit an ingestion batch
pub fn apply_ingestion(
    state: &mut SessionState,
    catalog: &Catalog,
    prior: Phase,
    ingestion: Ingestion,
    propose_structure: bool,
) {
    let first = prior == Phase::WaitingForUpload;
    let count = ingestion.file_names.len();

    state.combined_source_text = ingestion.combined_source_text;
    state.file_names.extend(ingestion.file_names);

    let mut failures = Vec::new();
    for (key, extraction) in ingestion.extracted {
        match extraction {
            SectionExtraction::Found(text) => state.original.set(key, text),
            // A failed re-extraction keeps what the previous pass found
            SectionExtraction::Failed(msg) => {
                if first {
                    state.original.set(key, "");
                }
                failures.push(msg);
            }
        }
    }
    for msg in failures {
        state.log(ChatEntry::system(msg));
    }

    if !first {
        // Only the originals are refreshed; cursor and rewritten text stay.
        state.phase = prior;
        state.log(ChatEntry::system(format!(
            "Added {} document(s). The original text for each section was refreshed.",
            count
        )));
        info!("Re-ingested {} file(s), staying in {}", count, prior);
        return;
    }

    state.log(ChatEntry::system(format!(
        "Processed {} document(s). Let's rewrite your article section by section.",
        count
    )));

    if propose_structure {
        state.phase = Phase::Structuring;
        match ingestion.structure {
            Some(Ok(structure)) => {
                state.proposed_structure = Some(structure);
                state.log(ChatEntry::bot(
                    "I analysed your document and propose the structure shown. Approve it to start writing, or ask for changes.",
                ));
            }
            Some(Err(error)) => {
                state.last_error = Some(error.clone());
                state.log(ChatEntry::system(format!(
                    "A structure could not be generated ({}). Ask for a new proposal to try again.",
                    error
                )));
            }
            None => {}
        }
        info!("First ingestion complete, entering {}", state.phase);
        return;
    }

    enter_section(state, catalog, 0);
    info!("First ingestion complete, entering {} at section 0", state.phase);
}

// ---------------------------------------------------------------------------
// Structure proposal (outline variant)
// ---------------------------------------------------------------------------

/// Source text for a structure regeneration
pub fn structure_request(state: &SessionState) -> Result<String, InvariantViolation> {
    require_phase(state, Phase::Structuring)?;
    Ok(state.combined_source_text.clone())
}

/// Replace the proposal with the latest regeneration
pub fn apply_structure(state: &mut SessionState, proposal: String, feedback: Option<&str>) {
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        state.log(ChatEntry::user(feedback));
    }
    state.proposed_structure = Some(proposal);
    state.log(ChatEntry::bot("Here is a revised structure proposal."));
}

/// Freeze the proposal and start rewriting; returns the inputs for the
/// initial question
pub fn approve_structure(
    state: &mut SessionState,
    catalog: &Catalog,
) -> Result<(String, String), InvariantViolation> {
    require_phase(state, Phase::Structuring)?;
    let structure = state
        .proposed_structure
        .clone()
        .ok_or(InvariantViolation::NoStructure)?;

    state.structure_approved = true;
    state.log(ChatEntry::system("Structure approved. Let's start writing!"));
    enter_section(state, catalog, 0);
    Ok((state.combined_source_text.clone(), structure))
}

pub fn apply_initial_question(state: &mut SessionState, question: String) {
    state.log(ChatEntry::bot(question));
}

// ---------------------------------------------------------------------------
// Drafting and polishing
// ---------------------------------------------------------------------------

/// Local edit of the current section's draft; no oracle call
pub fn set_draft(state: &mut SessionState, catalog: &Catalog, text: &str) -> Result<(), InvariantViolation> {
    let key = current_section(state, catalog)?.key;
    state.draft.set(key, text);
    Ok(())
}

/// Inputs captured for one polish round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolishRequest {
    pub key: SectionKey,
    pub index: usize,
    pub title: String,
    pub original: String,
    pub draft: String,
}

pub fn polish_request(state: &SessionState, catalog: &Catalog) -> Result<PolishRequest, InvariantViolation> {
    let section = current_section(state, catalog)?;
    let draft = state.draft.get(section.key);
    if draft.trim().is_empty() {
        return Err(InvariantViolation::EmptyDraft);
    }
    Ok(PolishRequest {
        key: section.key,
        index: state.current_section_index,
        title: section.title.clone(),
        original: state.original.get(section.key).to_string(),
        draft: draft.to_string(),
    })
}

/// Oracle outputs of one polish round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolishOutcome {
    pub polished: String,
    pub followup: Option<String>,
    pub suggestions: String,
    /// False when the polish call failed and the draft was kept
    pub from_oracle: bool,
}

pub fn apply_polish(
    state: &mut SessionState,
    req: &PolishRequest,
    outcome: PolishOutcome,
) -> Result<(), InvariantViolation> {
    require_phase(state, Phase::Rewriting)?;
    if state.current_section_index != req.index {
        return Err(InvariantViolation::NoActiveSection);
    }

    state.log(ChatEntry::user(req.draft.clone()));
    if !outcome.from_oracle {
        state.log(ChatEntry::system(
            "The section could not be polished right now; your own text was kept.",
        ));
    }

    state.article.set(req.key, outcome.polished.clone());
    state.draft.set(req.key, outcome.polished.clone());
    state.in_review = true;

    state.log(ChatEntry::bot(format!(
        "Here is the polished version of {}:\n\n{}",
        req.title, outcome.polished
    )));
    state.log(ChatEntry::bot(outcome.suggestions));
    if let Some(followup) = outcome.followup {
        state.log(ChatEntry::bot(followup));
    }
    debug!("Section '{}' polished, review loop entered", req.key);
    Ok(())
}

// ---------------------------------------------------------------------------
// Advancing
// ---------------------------------------------------------------------------

/// Result of moving the cursor forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// A new section is active and awaiting a draft
    NextSection(SectionKey),
    /// The references section was reached; carries the assembled article
    NeedsReferences { article: String },
    /// The catalog is exhausted
    Complete,
}

/// All authored, non-empty rewritten sections, each under its title
pub fn assemble_article(state: &SessionState, catalog: &Catalog) -> String {
    catalog
        .authored()
        .filter_map(|section| {
            let text = state.article.get(section.key).trim();
            (!text.is_empty()).then(|| format!("{}\n{}", section.title, text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn complete(state: &mut SessionState) {
    state.phase = Phase::EditingComplete;
    state.in_review = false;
    state.log(ChatEntry::system(
        "Your article is complete! You can still edit any section directly, then export it.",
    ));
    info!("Guided rewrite complete");
}

pub fn advance(state: &mut SessionState, catalog: &Catalog) -> Result<Advance, InvariantViolation> {
    current_section(state, catalog)?;
    if !state.in_review {
        return Err(InvariantViolation::NotInReview);
    }

    state.in_review = false;
    state.current_section_index += 1;
    let index = state.current_section_index;

    match catalog.get(index) {
        Some(section) if section.key.is_references() => {
            state.log(ChatEntry::bot(section.question.clone()));
            Ok(Advance::NeedsReferences {
                article: assemble_article(state, catalog),
            })
        }
        Some(section) => {
            let key = section.key;
            enter_section(state, catalog, index);
            info!("Advanced to section {} ({})", index, key);
            Ok(Advance::NextSection(key))
        }
        None => {
            complete(state);
            Ok(Advance::Complete)
        }
    }
}

/// Write the generated references and finish the guided flow
pub fn apply_references(
    state: &mut SessionState,
    catalog: &Catalog,
    references: String,
) -> Result<(), InvariantViolation> {
    require_phase(state, Phase::Rewriting)?;
    let section = catalog
        .get(state.current_section_index)
        .filter(|s| s.key.is_references())
        .ok_or(InvariantViolation::NoActiveSection)?;

    state.article.set(section.key, references);
    complete(state);
    Ok(())
}

// ---------------------------------------------------------------------------
// Direct edits, chat composition and approval
// ---------------------------------------------------------------------------

/// Edit rewritten text directly, bypassing the oracle. Phase is unchanged.
pub fn edit_section(
    state: &mut SessionState,
    catalog: &Catalog,
    key: SectionKey,
    text: &str,
) -> Result<(), InvariantViolation> {
    if matches!(state.phase, Phase::WaitingForUpload | Phase::Processing | Phase::Structuring) {
        return Err(InvariantViolation::WrongPhase {
            expected: Phase::Rewriting,
            actual: state.phase,
        });
    }
    let position = catalog
        .position(key)
        .ok_or(InvariantViolation::UnknownSection(key))?;
    if state.phase == Phase::Rewriting && position > state.current_section_index {
        return Err(InvariantViolation::SectionNotReached(key));
    }

    state.article.set(key, text);
    let under_review = state.phase == Phase::Rewriting
        && state.in_review
        && position == state.current_section_index;
    if under_review {
        state.draft.set(key, text);
    }
    Ok(())
}

/// Inputs captured for one free-form chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeRequest {
    pub index: usize,
    pub message: String,
    pub source: String,
    pub current: String,
    pub structure: Option<String>,
}

pub fn compose_request(
    state: &SessionState,
    catalog: &Catalog,
    message: &str,
) -> Result<ComposeRequest, InvariantViolation> {
    let section = current_section(state, catalog)?;
    if message.trim().is_empty() {
        return Err(InvariantViolation::EmptyDraft);
    }
    Ok(ComposeRequest {
        index: state.current_section_index,
        message: message.trim().to_string(),
        source: state.combined_source_text.clone(),
        current: state.article.get(section.key).to_string(),
        structure: state.proposed_structure.clone(),
    })
}

/// Log the improved passage as an approvable suggestion; returns its entry id
pub fn apply_compose(
    state: &mut SessionState,
    req: &ComposeRequest,
    passage: String,
    followup: String,
) -> Result<Uuid, InvariantViolation> {
    require_phase(state, Phase::Rewriting)?;
    if state.current_section_index != req.index {
        return Err(InvariantViolation::NoActiveSection);
    }
    state.log(ChatEntry::user(req.message.clone()));
    let entry = ChatEntry::bot(
        "Here is an improved version of your answer. Approve it to add it to your article.",
    )
    .with_suggestion(passage);
    let id = entry.id;
    state.log(entry);
    state.pending_followup = Some(followup);
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Applied,
    /// The entry's suggestion had already been approved; nothing changed
    AlreadyApproved,
}

pub fn approve_suggestion(
    state: &mut SessionState,
    catalog: &Catalog,
    entry_id: Uuid,
) -> Result<Approval, InvariantViolation> {
    let entry_pos = state
        .conversation_log
        .iter()
        .position(|e| e.id == entry_id)
        .ok_or(InvariantViolation::UnknownEntry(entry_id))?;
    if state.conversation_log[entry_pos].suggestion.is_none() {
        return Ok(Approval::AlreadyApproved);
    }

    let section = current_section(state, catalog)?;
    let key = section.key;
    let title = section.title.clone();

    let suggestion = state.conversation_log[entry_pos]
        .suggestion
        .take()
        .unwrap_or_default();

    let existing = state.article.get(key).trim_end();
    let updated = if existing.is_empty() {
        suggestion
    } else {
        format!("{}\n\n{}", existing, suggestion)
    };
    state.article.set(key, updated.clone());
    if state.in_review {
        state.draft.set(key, updated);
    }

    state.log(ChatEntry::system(format!(
        "Suggestion approved and added to {}.",
        title
    )));
    let followup = state
        .pending_followup
        .take()
        .unwrap_or_else(|| prompts::FOLLOWUP_FALLBACK.to_string());
    state.log(ChatEntry::bot(followup));
    Ok(Approval::Applied)
}
