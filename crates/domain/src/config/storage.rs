use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where sessions, transcripts and staged uploads live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for `sessions/sessions.json` and the per-session JSONL files.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// Uploaded documents are copied under `data_dir/<transcript_id>/`.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,

    /// Keep history in memory only; nothing is written to `state_path`.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            data_dir: d_data_dir(),
            ephemeral: false,
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_data_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
