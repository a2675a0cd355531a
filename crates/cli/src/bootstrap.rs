//! Controller construction shared by every subcommand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use dc_answerer::LocalAnswererFactory;
use dc_conversation::ConversationController;
use dc_domain::config::Config;
use dc_sessions::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore, SessionRegistry};

/// Validate config, wire registry, history store and answerer factory into
/// one [`ConversationController`], and rebind documents kept from earlier
/// runs.
pub async fn build_controller(config: &Config) -> anyhow::Result<ConversationController> {
    let problems = config.validate();
    for problem in &problems {
        tracing::error!("config: {problem}");
    }
    if !problems.is_empty() {
        anyhow::bail!("config validation failed with {} error(s)", problems.len());
    }

    let prefix = &config.sessions.name_prefix;
    let (registry, history): (SessionRegistry, Arc<dyn HistoryStore>) =
        if config.storage.ephemeral {
            tracing::info!("ephemeral storage: history is kept in memory only");
            (
                SessionRegistry::new(prefix),
                Arc::new(MemoryHistoryStore::new()),
            )
        } else {
            let state_path = &config.storage.state_path;
            let registry = SessionRegistry::load(state_path, prefix)
                .with_context(|| format!("loading sessions from {}", state_path.display()))?;
            let history = JsonlHistoryStore::new(state_path)
                .with_context(|| format!("opening history in {}", state_path.display()))?;
            (registry, Arc::new(history))
        };

    let factory = Arc::new(LocalAnswererFactory::new(
        config.answerer.clone(),
        config.storage.data_dir.clone(),
    ));

    let timeout = config.answerer.ask_timeout_secs.map(Duration::from_secs);
    let ctl = ConversationController::new(registry, history, factory).with_ask_timeout(timeout);

    let restored = ctl.restore_answerers().await;
    if restored > 0 {
        tracing::info!(sessions = restored, "restored documents from earlier runs");
    }
    Ok(ctl)
}
