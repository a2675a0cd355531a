use clap::Parser;
use tracing_subscriber::EnvFilter;

use dc_cli::cli::{Cli, Command, ConfigCommand};
use dc_domain::config::LoggingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to chat when no subcommand is given.
        None | Some(Command::Chat) => {
            let (config, _) = dc_cli::cli::load_config()?;
            init_tracing(&config.logging);
            dc_cli::cli::chat::chat(&config).await
        }
        Some(Command::Sessions) => {
            let (config, _) = dc_cli::cli::load_config()?;
            init_tracing(&config.logging);
            dc_cli::cli::sessions::list(&config).await
        }
        Some(Command::Ask {
            question,
            session,
            documents,
        }) => {
            let (config, _) = dc_cli::cli::load_config()?;
            init_tracing(&config.logging);
            dc_cli::cli::ask::run(&config, question, session, documents).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = dc_cli::cli::load_config()?;
            let valid = dc_cli::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = dc_cli::cli::load_config()?;
            dc_cli::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("docchat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize stderr tracing so diagnostics never mix with answers on
/// stdout.  `RUST_LOG` overrides the configured filter.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
