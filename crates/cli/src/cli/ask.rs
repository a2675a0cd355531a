//! `docchat ask`: one-shot question, optionally attaching documents first.

use std::path::PathBuf;

use dc_domain::config::Config;
use dc_domain::error::Error;

use crate::bootstrap;

pub async fn run(
    config: &Config,
    question: String,
    session: Option<String>,
    documents: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let ctl = bootstrap::build_controller(config).await?;

    let name = match session {
        Some(name) => {
            ctl.activate(&name).await?;
            name
        }
        None => ctl.resume().await?,
    };

    if !documents.is_empty() {
        ctl.attach_documents(&name, &documents).await?;
    } else if !ctl.has_answerer(&name)? {
        anyhow::bail!("session {name} has no documents; pass one or more --doc <path>");
    }
    match ctl.ask(&name, &question).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(Error::Persistence(reason)) => {
            // The answer is in the in-memory transcript even though it
            // was not saved.
            if let Some(turn) = ctl.transcript(&name)?.last() {
                println!("{}", turn.content);
            }
            anyhow::bail!("answer not saved to history: {reason}")
        }
        Err(e) => Err(e.into()),
    }
}
