//! Terminal front-end for Coach Greg.
//!
//! Reads one question per line, streams the reply as it arrives, and keeps the
//! transcript. Slash commands cover reset, export, and the comparison toggle.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use coach_greg::agent_core::turn::ERROR_NOTICE_PREFIX;
use coach_greg::agent_core::{AgentError, ChatSession, Transcript, TurnRequest};
use coach_greg::inference::config::{expand_tilde, load_or_default};
use coach_greg::inference::credentials::{Credentials, SecretsFile, SECRETS_FILE_NAME};
use coach_greg::inference::ChatConfig;

const DEFAULT_EXPORT_PATH: &str = "chat_transcript.txt";

const PLACEHOLDER: &str =
    "Ask about Agile or Traditional PM (e.g., 'Sprint Review agenda' or 'baseline variance handling')";

const HELP: &str = "\
Commands:
  /reset            clear the conversation
  /export [path]    save the transcript (default chat_transcript.txt, .json for JSON)
  /compare on|off   force the Agile vs. Traditional comparison
  /history          print the transcript
  /help             show this help
  /quit             exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Ask(String),
    Reset,
    Export(PathBuf),
    Compare(Option<bool>),
    History,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "reset" => Command::Reset,
        "export" => Command::Export(PathBuf::from(if arg.is_empty() {
            DEFAULT_EXPORT_PATH
        } else {
            arg
        })),
        "compare" => Command::Compare(match arg {
            "on" | "true" | "1" => Some(true),
            "off" | "false" | "0" => Some(false),
            _ => None,
        }),
        "history" => Command::History,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

/// Secrets file: `secrets_path` from the config (relative to the config file),
/// else `secrets.yaml` next to the config, else in the working directory.
fn secrets_path(config: &ChatConfig, config_path: Option<&Path>, cwd: &Path) -> PathBuf {
    let base = config_path.and_then(Path::parent).unwrap_or(cwd);
    match &config.secrets_path {
        Some(p) => {
            let p = PathBuf::from(expand_tilde(p));
            if p.is_absolute() {
                p
            } else {
                base.join(p)
            }
        }
        None => base.join(SECRETS_FILE_NAME),
    }
}

/// A `.env` load error worth reporting. A missing file is not one.
fn dotenv_failure<T>(result: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    match result {
        Err(e) if !e.not_found() => Some(e),
        _ => None,
    }
}

fn prompt_marker() -> std::io::Result<()> {
    let mut out = std::io::stdout();
    write!(out, "\n> ")?;
    out.flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development keeps OPENAI_API_KEY in .env
    let dotenv = dotenvy::dotenv();

    let log_path = coach_greg::init_tracing().context("failed to initialize logging")?;
    if let Some(e) = dotenv_failure(dotenv) {
        tracing::warn!(error = %e, "failed to load .env");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cwd = std::env::current_dir().context("failed to read working directory")?;

    let (mut config, config_path) = load_or_default(&cwd)?;
    if args.iter().any(|a| a == "--offline") {
        config.use_remote = false;
    }
    let mut force_compare = args.iter().any(|a| a == "--compare");

    let secrets = SecretsFile::open(secrets_path(&config, config_path.as_deref(), &cwd));
    let credentials = Credentials::new(Arc::new(secrets));
    let session = ChatSession::from_config(&config, credentials)?;
    let mut transcript = Transcript::new(config.history_window);

    println!("Ask Coach Greg?");
    println!(
        "Model: {} (locked){}",
        coach_greg::inference::CANONICAL_MODEL,
        if config.use_remote { "" } else { " | offline mock" }
    );
    println!("Logs: {}", log_path.display());
    println!("{PLACEHOLDER}");
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt_marker()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Reset => {
                transcript.clear();
                println!("Conversation reset.");
            }
            Command::History => {
                if transcript.is_empty() {
                    println!("(no messages yet)");
                } else {
                    println!("{}", transcript.export_text());
                }
            }
            Command::Export(path) => {
                if transcript.is_empty() {
                    println!("Nothing to export yet.");
                } else {
                    match transcript.write_export(&path) {
                        Ok(()) => println!("Transcript saved to {}", path.display()),
                        Err(e) => eprintln!("{e}"),
                    }
                }
            }
            Command::Compare(Some(on)) => {
                force_compare = on;
                println!("Comparison override {}.", if on { "on" } else { "off" });
            }
            Command::Compare(None) => println!("Usage: /compare on|off"),
            Command::Unknown(name) => println!("Unknown command '/{name}'. Type /help."),
            Command::Ask(text) => {
                let request = match TurnRequest::new(text, force_compare) {
                    Ok(request) => request,
                    Err(AgentError::EmptyMessage) => continue,
                    Err(e) => return Err(e.into()),
                };

                let mut out = std::io::stdout();
                let (next, outcome) = session
                    .run_turn(transcript, &request, |fragment| {
                        // Best effort: a closed stdout only loses display
                        let _ = write!(out, "{fragment}");
                        let _ = out.flush();
                    })
                    .await;
                transcript = next;

                if let Some(err) = &outcome.error {
                    let detail = err.provider_message().unwrap_or_else(|| err.to_string());
                    eprintln!("\n{ERROR_NOTICE_PREFIX}{detail}");
                } else {
                    println!();
                }
            }
        }
    }

    tracing::info!(entries = transcript.len(), "session ended");
    Ok(())
}
