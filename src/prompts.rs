//! Prompt templates, local fallbacks and the oracle reply format

/// Separates a polished passage from the follow-up question in a reply
pub const FOLLOWUP_DELIMITER: &str = "---FOLLOWUP---";

/// Extraction answer meaning "nothing in the source for this section"
pub const NOT_FOUND_SENTINEL: &str =
    "No relevant information found for this section in the provided document.";

pub const NOTHING_TO_COMPARE: &str = "There is no original text to compare against, so you seem to be on the right track! Accept and continue when you are ready.";
pub const SUGGESTIONS_FALLBACK: &str = "I couldn't generate suggestions right now. Please review the text yourself and continue when you are ready.";
pub const REFERENCES_FALLBACK: &str = "The reference list couldn't be generated right now. You can try again later or add it manually.";
pub const INITIAL_QUESTION_FALLBACK: &str =
    "To get started, what is the main idea you want your reader to take away from this document?";
pub const FOLLOWUP_FALLBACK: &str = "What else would you like to add to this section?";

/// Bound on the source text sent for structure proposals
pub const STRUCTURE_SOURCE_LIMIT: usize = 15_000;
/// Bound on the source excerpt sent with conversational calls
pub const EXCERPT_LIMIT: usize = 4_000;

pub const SYSTEM_EXTRACT: &str = "You are an expert researcher and academic writer. Extract the content of one section of a scientific article from a source document.";
pub const SYSTEM_STRUCTURE: &str = "You are an academic editor. Propose a clear, well-organised structure for the document you are given.";
pub const SYSTEM_INITIAL_QUESTION: &str = "You are a writing coach. Ask the author a single open question that starts the rewrite.";
pub const SYSTEM_POLISH: &str = "You are an expert academic editor. Merge two versions of an article section into one polished version.";
pub const SYSTEM_SUGGESTIONS: &str = "You are an academic reviewer. Compare an original section with its polished version and suggest improvements.";
pub const SYSTEM_REFERENCES: &str = "You are a research librarian. Produce a reference list for an academic article.";
pub const SYSTEM_COMPOSE: &str = "You are a writing assistant. Improve the author's answer and ask the next question.";

/// A fully built generation request
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub system: &'static str,
    pub prompt: String,
    pub temperature: f32,
}

/// Parsed reply: primary text plus an optional follow-up question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReply {
    pub primary: String,
    pub followup: Option<String>,
}

impl OracleReply {
    pub fn followup_or(&self, default: &str) -> String {
        self.followup.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Split a reply on the first follow-up delimiter. Tolerant: a missing
/// delimiter means the whole text is primary.
pub fn parse_reply(text: &str) -> OracleReply {
    match text.split_once(FOLLOWUP_DELIMITER) {
        Some((primary, followup)) => {
            let followup = followup.trim();
            OracleReply {
                primary: primary.trim().to_string(),
                followup: (!followup.is_empty()).then(|| followup.to_string()),
            }
        }
        None => OracleReply {
            primary: text.trim().to_string(),
            followup: None,
        },
    }
}

/// Map the not-found sentinel (and blank output) to empty text
pub fn normalize_extraction(text: &str) -> String {
    let trimmed = text.trim();
    let bare = trimmed.trim_matches(|c: char| c == '"' || c == '.' || c.is_whitespace());
    let sentinel = NOT_FOUND_SENTINEL.trim_end_matches('.');
    if bare.is_empty() || bare.eq_ignore_ascii_case(sentinel) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// First `max` characters of `text`, on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn extraction_failed(title: &str) -> String {
    format!(
        "Sorry, an error occurred while processing the section \"{}\".",
        title
    )
}

pub fn extract_section(title: &str, source: &str) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_EXTRACT,
        prompt: format!(
            "From the following document, extract and summarise the content for the section \"{title}\".\n\
             Write one concise, well-written paragraph.\n\
             If the document has no explicit information for this section, answer exactly: \"{NOT_FOUND_SENTINEL}\"\n\
             Do not add comments or introductions.\n\n\
             Document:\n\"\"\"\n{source}\n\"\"\""
        ),
        temperature: 0.2,
    }
}

pub fn propose_structure(source: &str, feedback: Option<&str>) -> OracleRequest {
    let mut prompt = format!(
        "Propose a structure for the document below as a markdown outline \
         (headings with '#', bullet points with '-'). Answer with the outline only.\n\n\
         Document:\n\"\"\"\n{}\n\"\"\"",
        truncate_chars(source, STRUCTURE_SOURCE_LIMIT)
    );
    if let Some(feedback) = feedback.map(str::trim).filter(|f| !f.is_empty()) {
        prompt.push_str(&format!(
            "\n\nThe author asked for these changes to the previous proposal:\n\"\"\"\n{}\n\"\"\"",
            feedback
        ));
    }
    OracleRequest {
        system: SYSTEM_STRUCTURE,
        prompt,
        temperature: 0.4,
    }
}

pub fn initial_question(source: &str, structure: &str) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_INITIAL_QUESTION,
        prompt: format!(
            "Approved structure:\n{}\n\nDocument excerpt:\n\"\"\"\n{}\n\"\"\"\n\n\
             Ask one open question that helps the author start rewriting. Answer with the question only.",
            structure,
            truncate_chars(source, EXCERPT_LIMIT)
        ),
        temperature: 0.7,
    }
}

pub fn polish(original: &str, draft: &str, title: &str) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_POLISH,
        prompt: format!(
            "Section: {title}\n\n\
             Keep the tone and voice of the author's version; keep every fact and key point of the original; \
             do not invent content. Answer with the polished text only. You may append one question for the \
             author after a line containing {FOLLOWUP_DELIMITER}.\n\n\
             Original version:\n\"\"\"\n{original}\n\"\"\"\n\n\
             Author's version:\n\"\"\"\n{draft}\n\"\"\""
        ),
        temperature: 0.5,
    }
}

pub fn suggestions(original: &str, polished: &str) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_SUGGESTIONS,
        prompt: format!(
            "List 2-3 specific, actionable suggestions as a markdown list. Point out any key data or argument \
             from the original that the polished version lost. Where it strengthens the argument, suggest real \
             citations in APA 7 style, e.g. (Smith, 2021).\n\n\
             Original version:\n\"\"\"\n{original}\n\"\"\"\n\n\
             Polished version:\n\"\"\"\n{polished}\n\"\"\""
        ),
        temperature: 0.6,
    }
}

pub fn references(article: &str) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_REFERENCES,
        prompt: format!(
            "Produce 5 to 10 real academic references in APA 7 style relevant to the article below. \
             One reference per line, no heading, no introduction.\n\n\
             Article:\n\"\"\"\n{article}\n\"\"\""
        ),
        temperature: 0.3,
    }
}

pub fn compose(message: &str, source: &str, current: &str, structure: Option<&str>) -> OracleRequest {
    OracleRequest {
        system: SYSTEM_COMPOSE,
        prompt: format!(
            "Structure:\n{}\n\nSource excerpt:\n\"\"\"\n{}\n\"\"\"\n\nText written so far:\n\"\"\"\n{}\n\"\"\"\n\n\
             Author's answer:\n\"\"\"\n{}\n\"\"\"\n\n\
             Rewrite the answer as a polished passage, then write {} on its own line, then ask the next question.",
            structure.unwrap_or("(none)"),
            truncate_chars(source, EXCERPT_LIMIT),
            current,
            message,
            FOLLOWUP_DELIMITER
        ),
        temperature: 0.7,
    }
}
