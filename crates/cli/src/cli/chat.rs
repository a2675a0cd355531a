//! `docchat chat`: interactive REPL command.
//!
//! Opens a readline loop bound to the active session.  Plain lines are
//! questions; slash-commands manage sessions and uploads.

use std::path::PathBuf;

use dc_conversation::ConversationController;
use dc_domain::config::Config;
use dc_domain::error::Error;
use dc_domain::turn::Role;

use crate::bootstrap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
pub async fn chat(config: &Config) -> anyhow::Result<()> {
    let ctl = bootstrap::build_controller(config).await?;
    let active = ctl.resume().await?;

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".docchat")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // Keep stdout for answers.
    eprintln!("DocChat interactive chat");
    eprintln!("Session: {active}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();
    print_transcript(&ctl);

    loop {
        let prompt = format!("{}> ", ctl.active_session().unwrap_or_default());
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    match parse_command(trimmed) {
                        Ok(SlashCommand::Exit) => break,
                        Ok(cmd) => {
                            if let Err(e) = run_command(&ctl, cmd).await {
                                eprintln!("\x1B[31merror: {e}\x1B[0m");
                            }
                        }
                        Err(usage) => eprintln!("{usage}"),
                    }
                    continue;
                }

                ask_active(&ctl, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    New,
    Sessions,
    Switch(String),
    Rename(String),
    Upload(Vec<PathBuf>),
    History,
    Status,
    Help,
    Exit,
}

/// Parse a slash command.  `Err` carries a usage message.
fn parse_command(input: &str) -> Result<SlashCommand, String> {
    let (cmd, arg) = match input.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (input, ""),
    };

    match cmd {
        "/exit" | "/quit" => Ok(SlashCommand::Exit),
        "/new" => Ok(SlashCommand::New),
        "/sessions" => Ok(SlashCommand::Sessions),
        "/history" => Ok(SlashCommand::History),
        "/status" => Ok(SlashCommand::Status),
        "/help" => Ok(SlashCommand::Help),
        "/switch" if !arg.is_empty() => Ok(SlashCommand::Switch(arg.to_owned())),
        "/switch" => Err("Usage: /switch <name>".into()),
        "/rename" if !arg.is_empty() => Ok(SlashCommand::Rename(arg.to_owned())),
        "/rename" => Err("Usage: /rename <new name>".into()),
        "/upload" if !arg.is_empty() => Ok(SlashCommand::Upload(
            split_args(arg)?.into_iter().map(PathBuf::from).collect(),
        )),
        "/upload" => Err("Usage: /upload <path> [<path>...]".into()),
        other => Err(format!("Unknown command: {other}  (type /help for a list)")),
    }
}

/// Split on whitespace, keeping single- or double-quoted runs together.
fn split_args(input: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(format!("Unclosed {q} in arguments"));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

async fn run_command(ctl: &ConversationController, cmd: SlashCommand) -> anyhow::Result<()> {
    match cmd {
        SlashCommand::New => {
            let name = ctl.new_chat().await?;
            eprintln!("Started new session: {name}");
        }
        SlashCommand::Sessions => {
            let active = ctl.active_session();
            for name in ctl.list_sessions() {
                let status = ctl.status(&name)?;
                let marker = if active.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                let docs = status
                    .documents
                    .map_or_else(|| "no documents".to_owned(), |n| format!("{n} document(s)"));
                eprintln!("{marker} {name}  ({docs})");
            }
        }
        SlashCommand::Switch(name) => {
            ctl.activate(&name).await?;
            eprintln!("Switched to: {name}");
            print_transcript(ctl);
        }
        SlashCommand::Rename(new_name) => {
            let current = active_or_err(ctl)?;
            let renamed = ctl.rename_session(&current, &new_name).await?;
            eprintln!("Renamed to: {renamed}");
        }
        SlashCommand::Upload(paths) => {
            let current = active_or_err(ctl)?;
            eprintln!("Processing {} document(s)...", paths.len());
            ctl.attach_documents(&current, &paths).await?;
            eprintln!("Ready. Ask anything about the uploaded documents.");
        }
        SlashCommand::History => print_transcript(ctl),
        SlashCommand::Status => {
            let current = active_or_err(ctl)?;
            let status = ctl.status(&current)?;
            eprintln!("Session:   {}", status.name);
            eprintln!("Turns:     {}", status.turns);
            match status.documents {
                Some(n) => eprintln!("Documents: {n}"),
                None => eprintln!("Documents: none (use /upload)"),
            }
            if status.degraded {
                eprintln!("Warning:   some turns were not saved; /switch back to reload");
            }
        }
        SlashCommand::Help => {
            eprintln!("Commands:");
            eprintln!("  /new               Start a new session and switch to it");
            eprintln!("  /sessions          List sessions (* marks the active one)");
            eprintln!("  /switch <name>     Switch to a session and reload its history");
            eprintln!("  /rename <name>     Rename the active session");
            eprintln!("  /upload <path>...  Index documents for the active session (quote paths with spaces)");
            eprintln!("  /history           Show the active transcript");
            eprintln!("  /status            Show details of the active session");
            eprintln!("  /exit, /quit       Exit the chat");
            eprintln!("  /help              Show this help");
        }
        SlashCommand::Exit => {}
    }
    Ok(())
}

fn active_or_err(ctl: &ConversationController) -> anyhow::Result<String> {
    ctl.active_session()
        .ok_or_else(|| anyhow::anyhow!("no active session (use /new or /switch)"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Questions + transcript display
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn ask_active(ctl: &ConversationController, question: &str) {
    let Some(name) = ctl.active_session() else {
        eprintln!("No active session (use /new or /switch).");
        return;
    };

    eprintln!("\x1B[2mThinking...\x1B[0m");
    match ctl.ask(&name, question).await {
        Ok(answer) => {
            println!("{answer}");
            println!();
        }
        Err(Error::NoAnswererBound(_)) => {
            eprintln!("Upload one or more documents with /upload <path> to begin chatting.");
        }
        Err(Error::Persistence(reason)) => {
            if let Some(turn) = ctl.active_transcript().last() {
                println!("{}", turn.content);
                println!();
            }
            eprintln!("\x1B[33mwarning: answer not saved to history: {reason}\x1B[0m");
        }
        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
    }
}

fn print_transcript(ctl: &ConversationController) {
    let transcript = ctl.active_transcript();
    if transcript.is_empty() {
        eprintln!("Start chatting: ask any question about your uploaded documents.");
        return;
    }
    for turn in transcript {
        match turn.role {
            Role::User => eprintln!("\x1B[34myou>\x1B[0m {}", turn.content),
            Role::Assistant => eprintln!("\x1B[32mbot>\x1B[0m {}", turn.content),
        }
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_argument_free_commands() {
        assert_eq!(parse_command("/new"), Ok(SlashCommand::New));
        assert_eq!(parse_command("/quit"), Ok(SlashCommand::Exit));
        assert_eq!(parse_command("/sessions"), Ok(SlashCommand::Sessions));
    }

    #[test]
    fn rename_keeps_inner_spaces() {
        assert_eq!(
            parse_command("/rename  quarterly report "),
            Ok(SlashCommand::Rename("quarterly report".into()))
        );
    }

    #[test]
    fn upload_splits_paths() {
        assert_eq!(
            parse_command("/upload a.txt  docs/b.md"),
            Ok(SlashCommand::Upload(vec![
                PathBuf::from("a.txt"),
                PathBuf::from("docs/b.md")
            ]))
        );
    }

    #[test]
    fn upload_accepts_quoted_paths() {
        assert_eq!(
            parse_command(r#"/upload "My Notes/q1 report.pdf" 'a b.txt' plain.md"#),
            Ok(SlashCommand::Upload(vec![
                PathBuf::from("My Notes/q1 report.pdf"),
                PathBuf::from("a b.txt"),
                PathBuf::from("plain.md"),
            ]))
        );
    }

    #[test]
    fn upload_rejects_unclosed_quote() {
        assert!(parse_command(r#"/upload "half.pdf"#)
            .unwrap_err()
            .starts_with("Unclosed"));
    }

    #[test]
    fn missing_arguments_give_usage() {
        assert!(parse_command("/switch").unwrap_err().starts_with("Usage"));
        assert!(parse_command("/upload   ").unwrap_err().starts_with("Usage"));
    }

    #[test]
    fn unknown_command() {
        assert!(parse_command("/frobnicate").unwrap_err().contains("Unknown command"));
    }
}
