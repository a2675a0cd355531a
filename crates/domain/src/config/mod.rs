mod answerer;
mod logging;
mod sessions;
mod storage;

pub use answerer::*;
pub use logging::*;
pub use sessions::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub answerer: AnswererConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check semantic constraints that serde cannot express.
    ///
    /// Returns one human-readable message per problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.sessions.name_prefix.trim().is_empty() {
            problems.push("sessions.name_prefix must not be blank".to_owned());
        }
        if self.answerer.top_k == 0 {
            problems.push("answerer.top_k must be at least 1".to_owned());
        }
        if self.answerer.max_passage_chars < 64 {
            problems.push("answerer.max_passage_chars must be at least 64".to_owned());
        }
        if self.answerer.allowed_extensions.is_empty() {
            problems.push("answerer.allowed_extensions must not be empty".to_owned());
        }
        if self.answerer.ask_timeout_secs == Some(0) {
            problems.push("answerer.ask_timeout_secs must be positive when set".to_owned());
        }

        problems
    }
}
