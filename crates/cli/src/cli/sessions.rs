//! `docchat sessions`: list sessions with their stored turn counts.

use dc_domain::config::Config;

use crate::bootstrap;

pub async fn list(config: &Config) -> anyhow::Result<()> {
    let ctl = bootstrap::build_controller(config).await?;
    let names = ctl.list_sessions();
    if names.is_empty() {
        eprintln!("No sessions yet. Start one with `docchat chat`.");
        return Ok(());
    }

    for name in names {
        let stored = ctl.stored_turns(&name).await?;
        println!("{name}\t{stored} turn(s)");
    }
    Ok(())
}
