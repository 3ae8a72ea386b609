//! Service configuration from environment variables

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ORACLE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SESSION_DIR: &str = ".scribe";
pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ScribeConfig {
    pub port: u16,
    pub session_dir: PathBuf,
    pub api_key: Option<String>,
    pub model: String,
    pub oracle_url: String,
    /// Propose a document-wide outline before rewriting starts
    pub propose_structure: bool,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            propose_structure: false,
        }
    }
}

impl ScribeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; unset or unparsable values keep
    /// their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = non_empty("SCRIBE_PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.port);

        let propose_structure = non_empty("SCRIBE_PROPOSE_STRUCTURE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.propose_structure);

        Self {
            port,
            session_dir: non_empty("SCRIBE_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")),
            model: non_empty("SCRIBE_MODEL").unwrap_or(defaults.model),
            oracle_url: non_empty("SCRIBE_ORACLE_URL").unwrap_or(defaults.oracle_url),
            propose_structure,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.session_dir.join(SESSION_FILE)
    }
}
