//! Core type definitions for guided article rewriting

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of one article section
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Problem,
    Hypothesis,
    Importance,
    TheoreticalFramework,
    Methodology,
    Literature,
    Results,
    Analysis,
    Conclusion,
    FutureResearch,
    References,
}

impl SectionKey {
    pub const ALL: [SectionKey; 11] = [
        SectionKey::Problem,
        SectionKey::Hypothesis,
        SectionKey::Importance,
        SectionKey::TheoreticalFramework,
        SectionKey::Methodology,
        SectionKey::Literature,
        SectionKey::Results,
        SectionKey::Analysis,
        SectionKey::Conclusion,
        SectionKey::FutureResearch,
        SectionKey::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Problem => "problem",
            SectionKey::Hypothesis => "hypothesis",
            SectionKey::Importance => "importance",
            SectionKey::TheoreticalFramework => "theoretical_framework",
            SectionKey::Methodology => "methodology",
            SectionKey::Literature => "literature",
            SectionKey::Results => "results",
            SectionKey::Analysis => "analysis",
            SectionKey::Conclusion => "conclusion",
            SectionKey::FutureResearch => "future_research",
            SectionKey::References => "references",
        }
    }

    /// The references section is generated, never drafted by the user
    pub fn is_references(&self) -> bool {
        matches!(self, SectionKey::References)
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown section key '{}'", s))
    }
}

/// One entry of the section catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub key: SectionKey,
    pub title: String,
    pub question: String,  // asked when the section becomes current
    pub ordinal: usize,
}

/// Fixed, ordered sequence of sections the guided flow walks through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    sections: Vec<Section>,
}

impl Catalog {
    /// Build a catalog from `(key, title, question)` triples in order
    pub fn new<T, Q>(entries: Vec<(SectionKey, T, Q)>) -> Self
    where
        T: Into<String>,
        Q: Into<String>,
    {
        let sections: Vec<Section> = entries
            .into_iter()
            .enumerate()
            .map(|(ordinal, (key, title, question))| Section {
                key,
                title: title.into(),
                question: question.into(),
                ordinal,
            })
            .collect();

        debug_assert!(
            sections
                .iter()
                .enumerate()
                .all(|(i, s)| sections[..i].iter().all(|o| o.key != s.key)),
            "section keys must be unique"
        );

        Self { sections }
    }

    /// The eleven-section academic article
    pub fn academic() -> Self {
        Self::new(vec![
            (
                SectionKey::Problem,
                "1. Problem Statement",
                "To begin, what research problem are you addressing?",
            ),
            (
                SectionKey::Hypothesis,
                "2. Hypothesis",
                "Excellent. Now, what is your main hypothesis?",
            ),
            (
                SectionKey::Importance,
                "3. Importance and Justification",
                "Understood. Why is it important to investigate this problem?",
            ),
            (
                SectionKey::TheoreticalFramework,
                "4. Theoretical Framework",
                "Perfect. What theoretical framework supports your research?",
            ),
            (
                SectionKey::Methodology,
                "5. Methodology",
                "Very good. Which method or methodology will you follow?",
            ),
            (
                SectionKey::Literature,
                "6. Literature Review",
                "Let's continue. What does the existing literature say about this topic?",
            ),
            (
                SectionKey::Results,
                "7. Expected Results",
                "Interesting. What results do you expect to obtain?",
            ),
            (
                SectionKey::Analysis,
                "8. Analysis and Discussion",
                "Almost done. How do you plan to analyze and discuss the results?",
            ),
            (
                SectionKey::Conclusion,
                "9. Conclusions",
                "Finally, what are the preliminary conclusions or the expected impact?",
            ),
            (
                SectionKey::FutureResearch,
                "10. Future Research",
                "Excellent! Looking ahead, which future lines of research follow from your work?",
            ),
            (
                SectionKey::References,
                "11. References",
                "Based on our work I will generate a reference list for you. You don't need to write anything here.",
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Sections the user writes (everything except references)
    pub fn authored(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| !s.key.is_references())
    }

    pub fn position(&self, key: SectionKey) -> Option<usize> {
        self.sections.iter().position(|s| s.key == key)
    }

    pub fn section(&self, key: SectionKey) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::academic()
    }
}

/// Total mapping from every section key to its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SectionKey, String>", into = "BTreeMap<SectionKey, String>")]
pub struct Article {
    texts: BTreeMap<SectionKey, String>,
}

impl Article {
    pub fn get(&self, key: SectionKey) -> &str {
        self.texts.get(&key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: SectionKey, text: impl Into<String>) {
        self.texts.insert(key, text.into());
    }

    /// True when every section is empty
    pub fn is_blank(&self) -> bool {
        self.texts.values().all(|t| t.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionKey, &str)> {
        self.texts.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl Default for Article {
    fn default() -> Self {
        Self {
            texts: SectionKey::ALL
                .iter()
                .map(|k| (*k, String::new()))
                .collect(),
        }
    }
}

impl From<BTreeMap<SectionKey, String>> for Article {
    fn from(map: BTreeMap<SectionKey, String>) -> Self {
        let mut article = Article::default();
        for (key, text) in map {
            article.set(key, text);
        }
        article
    }
}

impl From<Article> for BTreeMap<SectionKey, String> {
    fn from(article: Article) -> Self {
        article.texts
    }
}

/// Phases of the guided rewrite flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    WaitingForUpload,
    Processing,
    Structuring,
    Rewriting,
    EditingComplete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::WaitingForUpload => "WAITING_FOR_UPLOAD",
            Phase::Processing => "PROCESSING",
            Phase::Structuring => "STRUCTURING",
            Phase::Rewriting => "REWRITING",
            Phase::EditingComplete => "EDITING_COMPLETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// One message of the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,  // cleared once approved
}

impl ChatEntry {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            suggestion: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Everything the orchestrator knows about one writing session
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SessionState {
    /// Rewritten (canonical, exported) article
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

    // Runtime only, never persisted
    pub is_loading: bool,
    #[serde(skip)]
    pub generation: u64,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn log(&mut self, entry: ChatEntry) {
        self.conversation_log.push(entry);
    }

    pub fn entry(&self, id: Uuid) -> Option<&ChatEntry> {
        self.conversation_log.iter().find(|e| e.id == id)
    }
}
