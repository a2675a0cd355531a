use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session naming rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Generated session names look like `<name_prefix>-<n>`.
    #[serde(default = "d_name_prefix")]
    pub name_prefix: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            name_prefix: d_name_prefix(),
        }
    }
}

fn d_name_prefix() -> String {
    "session".into()
}
