use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local answerer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tuning for the built-in extractive answerer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswererConfig {
    /// Passages quoted per answer.
    #[serde(default = "d_top_k")]
    pub top_k: usize,

    /// Paragraphs longer than this are split into several passages.
    #[serde(default = "d_max_passage_chars")]
    pub max_passage_chars: usize,

    /// Accepted document extensions (lowercase, without the dot).
    #[serde(default = "d_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Upper bound on a single answer.  `None` waits indefinitely.
    #[serde(default)]
    pub ask_timeout_secs: Option<u64>,
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            top_k: d_top_k(),
            max_passage_chars: d_max_passage_chars(),
            allowed_extensions: d_allowed_extensions(),
            ask_timeout_secs: None,
        }
    }
}

fn d_top_k() -> usize {
    3
}
fn d_max_passage_chars() -> usize {
    800
}
fn d_allowed_extensions() -> Vec<String> {
    vec!["pdf".into(), "txt".into(), "md".into(), "markdown".into()]
}
