//! Session persistence: a single durable slot holding the latest session

use crate::error::PersistenceError;
use crate::types::{Article, ChatEntry, Phase, SectionKey, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Persisted form of a session. Runtime-only fields are not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionRecord {
    pub article: Article,
    pub original: Article,
    pub draft: Article,
    pub current_section_index: usize,
    pub phase: Phase,
    pub combined_source_text: String,
    pub conversation_log: Vec<ChatEntry>,
    pub in_review: bool,
    pub file_names: Vec<String>,
    pub proposed_structure: Option<String>,
    pub structure_approved: bool,
    pub pending_followup: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn capture(state: &SessionState) -> Self {
        Self {
            article: state.article.clone(),
            original: state.original.clone(),
            draft: state.draft.clone(),
            current_section_index: state.current_section_index,
            phase: state.phase,
            combined_source_text: state.combined_source_text.clone(),
            conversation_log: state.conversation_log.clone(),
            in_review: state.in_review,
            file_names: state.file_names.clone(),
            proposed_structure: state.proposed_structure.clone(),
            structure_approved: state.structure_approved,
            pending_followup: state.pending_followup.clone(),
            saved_at: Some(Utc::now()),
        }
    }

    /// Overwrite the persisted fields of `state`; runtime fields are kept
    pub fn restore_into(self, state: &mut SessionState) {
        state.article = self.article;
        state.original = self.original;
        state.draft = self.draft;
        state.current_section_index = self.current_section_index;
        state.phase = self.phase;
        state.combined_source_text = self.combined_source_text;
        state.conversation_log = self.conversation_log;
        state.in_review = self.in_review;
        state.file_names = self.file_names;
        state.proposed_structure = self.proposed_structure;
        state.structure_approved = self.structure_approved;
        state.pending_followup = self.pending_followup;
    }

    /// Restore every field that is present and well-typed; the rest keep
    /// their defaults. Returns `None` when the document is not an object.
    pub fn from_value_lenient(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut record = SessionRecord::default();

        fn field<T: serde::de::DeserializeOwned>(obj: &serde_json::Map<String, Value>, name: &str) -> Option<T> {
            let raw = obj.get(name)?;
            match serde_json::from_value(raw.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Ignoring unreadable session field '{}': {}", name, e);
                    None
                }
            }
        }

        if let Some(a) = obj.get("article").and_then(lenient_article) {
            record.article = a;
        }
        if let Some(a) = obj.get("original").and_then(lenient_article) {
            record.original = a;
        }
        if let Some(a) = obj.get("draft").and_then(lenient_article) {
            record.draft = a;
        }
        if let Some(v) = field(obj, "current_section_index") {
            record.current_section_index = v;
        }
        if let Some(v) = field(obj, "phase") {
            record.phase = v;
        }
        if let Some(v) = field(obj, "combined_source_text") {
            record.combined_source_text = v;
        }
        if let Some(log) = obj.get("conversation_log").and_then(Value::as_array) {
            record.conversation_log = log
                .iter()
                .filter_map(|entry| serde_json::from_value::<ChatEntry>(entry.clone()).ok())
                .collect();
        }
        if let Some(v) = field(obj, "in_review") {
            record.in_review = v;
        }
        if let Some(v) = field(obj, "file_names") {
            record.file_names = v;
        }
        if let Some(v) = field(obj, "proposed_structure") {
            record.proposed_structure = v;
        }
        if let Some(v) = field(obj, "structure_approved") {
            record.structure_approved = v;
        }
        if let Some(v) = field(obj, "pending_followup") {
            record.pending_followup = v;
        }
        if let Some(v) = field(obj, "saved_at") {
            record.saved_at = v;
        }

        Some(record)
    }
}

/// Per-key restore of an article object; unknown keys and non-string
/// values are skipped
fn lenient_article(value: &Value) -> Option<Article> {
    let obj = value.as_object()?;
    let mut article = Article::default();
    for (key, text) in obj {
        match (key.parse::<SectionKey>(), text.as_str()) {
            (Ok(key), Some(text)) => article.set(key, text),
            _ => debug!("Skipping article entry '{}'", key),
        }
    }
    Some(article)
}

/// Durable key-value slot for one session
pub trait SessionStore: Send + Sync {
    fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError>;

    /// Absent slot, or one that is not a JSON object, loads as `None`
    fn load(&self) -> Result<Option<SessionRecord>, PersistenceError>;

    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Session slot backed by one JSON file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(record)?;

        // Write to a sibling temp file, then rename over the slot
        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);
        fs::rename(&tmp_path, &self.path)?;

        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionRecord>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(value) => Ok(SessionRecord::from_value_lenient(&value)),
            Err(e) => {
                warn!("Session file {} is not valid JSON: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process slot; holds the serialized form so loads go through the same
/// lenient path as the file store
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw JSON in the slot
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(record)?;
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionRecord>, PersistenceError> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slot
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|value| SessionRecord::from_value_lenient(&value)))
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_state() -> SessionState {
        let mut state = SessionState::default();
        state.article.set(SectionKey::Problem, "Rewritten problem.");
        state.article.set(SectionKey::Hypothesis, "Rewritten hypothesis.");
        state.original.set(SectionKey::Problem, "The problem is X.");
        state.draft.set(SectionKey::Hypothesis, "Rewritten hypothesis.");
        state.current_section_index = 1;
        state.phase = Phase::Rewriting;
        state.combined_source_text = "--- a.txt ---\nThe problem is X.".to_string();
        state.conversation_log = vec![
            ChatEntry::system("Processed 1 document(s)."),
            ChatEntry::bot("polished").with_suggestion("keep me"),
        ];
        state.in_review = true;
        state.file_names = vec!["a.txt".to_string()];
        state.proposed_structure = Some("# Outline".to_string());
        state.structure_approved = true;
        state.pending_followup = Some("Next?".to_string());
        state
    }

    #[test]
    fn test_file_round_trip_reproduces_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("session.json"));
        let state = populated_state();

        let record = SessionRecord::capture(&state);
        store.save(&record).unwrap();
        let loaded = store.load().unwrap().expect("record present");
        assert_eq!(loaded, record);

        let mut restored = SessionState::default();
        loaded.restore_into(&mut restored);
        assert_eq!(restored, state);
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_clear_removes_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("session.json"));
        store.save(&SessionRecord::capture(&populated_state())).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_lenient_load_keeps_valid_fields() {
        let store = MemoryStore::with_raw(
            r#"{
                "article": {"problem": "Kept", "abstract": "unknown key", "results": 7},
                "current_section_index": "three",
                "phase": "REWRITING",
                "in_review": true,
                "conversation_log": [
                    {"id": "6f1c1d36-3c35-4a4c-9d0e-6d4f2f8a9b10", "sender": "bot", "text": "hello"},
                    {"sender": "martian"}
                ],
                "file_names": "not-a-list"
            }"#,
        );

        let record = store.load().unwrap().expect("object parses");
        assert_eq!(record.article.get(SectionKey::Problem), "Kept");
        assert_eq!(record.article.get(SectionKey::Results), "");
        assert_eq!(record.current_section_index, 0);
        assert_eq!(record.phase, Phase::Rewriting);
        assert!(record.in_review);
        assert_eq!(record.conversation_log.len(), 1);
        assert!(record.file_names.is_empty());
    }

    #[test]
    fn test_non_object_is_absent() {
        assert_eq!(MemoryStore::with_raw("[1, 2]").load().unwrap(), None);
        assert_eq!(MemoryStore::with_raw("{not json").load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{\"phase\": ").unwrap();
        assert_eq!(JsonFileStore::new(path).load().unwrap(), None);
    }
}
