pub mod ask;
pub mod chat;
pub mod config;
pub mod sessions;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// DocChat: ask questions about your documents, one session at a time.
#[derive(Debug, Parser)]
#[command(name = "docchat", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat (default when no subcommand is given).
    Chat,
    /// List sessions in creation order.
    Sessions,
    /// Ask a single question, attaching documents first when given.
    Ask {
        /// The question to ask.
        question: String,
        /// Session name (defaults to the most recent session).
        #[arg(long)]
        session: Option<String>,
        /// Document to index, replacing the session's current set; repeat
        /// for several.  Without it the session's kept documents are used.
        #[arg(long = "doc")]
        documents: Vec<PathBuf>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `DC_CONFIG` (or `config.toml`
/// by default).  A missing file yields the defaults.  Returns the parsed
/// [`Config`](dc_domain::config::Config) and the path that was used.
pub fn load_config() -> anyhow::Result<(dc_domain::config::Config, String)> {
    let config_path = std::env::var("DC_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

fn load_config_from(config_path: &str) -> anyhow::Result<dc_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(dc_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
