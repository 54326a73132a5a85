//! Line-oriented console driver
//!
//! Reads one command per line and writes one JSON object per line: every
//! published snapshot, plus the outcome of commands that answer.

use daoshell_protocol::{AddressIdentity, SessionSnapshot};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::error::ShellError;
use crate::orchestrator::OrchestratorHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open(String),
    Back,
    Account(Option<String>),
    Prefs {
        screen: String,
        data: Option<(String, String)>,
    },
    ClosePrefs,
    Resolve(String),
    RequestIdentity(String),
    Save {
        address: String,
        label: String,
    },
    Cancel,
    ToggleSystemApps,
    State,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    let command = match word {
        "open" => ConsoleCommand::Open(
            args.next()
                .ok_or(ParseError::Usage("open <path>"))?
                .to_string(),
        ),
        "back" => ConsoleCommand::Back,
        "account" => match args.next() {
            None => return Err(ParseError::Usage("account <address>|none")),
            Some("none") => ConsoleCommand::Account(None),
            Some(address) => ConsoleCommand::Account(Some(address.to_string())),
        },
        "prefs" => {
            let screen = args
                .next()
                .ok_or(ParseError::Usage("prefs <screen> [key=value]"))?
                .to_string();
            let data = match args.next() {
                None => None,
                Some(pair) => {
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or(ParseError::Usage("prefs <screen> [key=value]"))?;
                    Some((key.to_string(), value.to_string()))
                }
            };
            ConsoleCommand::Prefs { screen, data }
        }
        "close-prefs" => ConsoleCommand::ClosePrefs,
        "resolve" => ConsoleCommand::Resolve(
            args.next()
                .ok_or(ParseError::Usage("resolve <address>"))?
                .to_string(),
        ),
        "request-identity" => ConsoleCommand::RequestIdentity(
            args.next()
                .ok_or(ParseError::Usage("request-identity <address>"))?
                .to_string(),
        ),
        "save" => {
            let (address, label) = rest
                .split_once(char::is_whitespace)
                .map(|(address, label)| (address, label.trim()))
                .filter(|(_, label)| !label.is_empty())
                .ok_or(ParseError::Usage("save <address> <label>"))?;
            ConsoleCommand::Save {
                address: address.to_string(),
                label: label.to_string(),
            }
        }
        "cancel" => ConsoleCommand::Cancel,
        "toggle-system-apps" => ConsoleCommand::ToggleSystemApps,
        "state" => ConsoleCommand::State,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// One line of console output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ConsoleOutput {
    Snapshot {
        snapshot: serde_json::Value,
    },
    Identity {
        address: String,
        identity: Option<AddressIdentity>,
    },
    Done {
        command: &'static str,
    },
    Error {
        command: &'static str,
        message: String,
    },
}

impl ConsoleOutput {
    fn snapshot(snapshot: &SessionSnapshot) -> serde_json::Result<Self> {
        Ok(ConsoleOutput::Snapshot {
            snapshot: serde_json::to_value(snapshot)?,
        })
    }

    fn outcome(command: &'static str, result: Result<(), ShellError>) -> Self {
        match result {
            Ok(()) => ConsoleOutput::Done { command },
            Err(e) => ConsoleOutput::Error {
                command,
                message: e.to_string(),
            },
        }
    }
}

/// How the console loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    EndOfInput,
    Fatal(String),
}

/// Drive the orchestrator from `input` until quit, end of input, or a fatal
/// snapshot.
pub async fn run<R, W>(
    handle: OrchestratorHandle,
    input: R,
    mut output: W,
) -> anyhow::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut updates = handle.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

    write_line(&mut output, &ConsoleOutput::snapshot(&handle.snapshot())?).await?;

    loop {
        // Snapshots already published are written before the next line is read.
        tokio::select! {
            biased;
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    write_line(&mut output, &ConsoleOutput::snapshot(&snapshot)?).await?;
                    if let Some(fatal) = &snapshot.fatal_error {
                        return Ok(ConsoleExit::Fatal(fatal.clone()));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "console",
                        event = "console.lagged",
                        skipped,
                    );
                    write_line(&mut output, &ConsoleOutput::snapshot(&handle.snapshot())?).await?;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(ConsoleExit::EndOfInput),
            },

            Some(reply) = reply_rx.recv() => {
                write_line(&mut output, &reply).await?;
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(ConsoleExit::EndOfInput);
                };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        write_line(&mut output, &ConsoleOutput::Error {
                            command: "parse",
                            message: e.to_string(),
                        }).await?;
                        continue;
                    }
                };
                info!(
                    component = "console",
                    event = "console.command",
                    command = ?command,
                );
                match command {
                    ConsoleCommand::Quit => return Ok(ConsoleExit::Quit),
                    ConsoleCommand::State => {
                        let line = match handle.state().await {
                            Ok(snapshot) => ConsoleOutput::snapshot(&snapshot)?,
                            Err(e) => ConsoleOutput::outcome("state", Err(e)),
                        };
                        write_line(&mut output, &line).await?;
                    }
                    other => dispatch(&handle, other, &reply_tx).await,
                }
            }
        }
    }
}

/// Send a command to the orchestrator. Commands that wait on the client
/// answer through `replies` from their own task.
async fn dispatch(
    handle: &OrchestratorHandle,
    command: ConsoleCommand,
    replies: &mpsc::UnboundedSender<ConsoleOutput>,
) {
    let result = match command {
        ConsoleCommand::Open(path) => handle.navigate(path).await,
        ConsoleCommand::Back => handle.navigate_back().await,
        ConsoleCommand::Account(account) => handle.set_wallet_account(account).await,
        ConsoleCommand::Prefs { screen, data } => handle.open_preferences(screen, data).await,
        ConsoleCommand::ClosePrefs => handle.close_preferences().await,
        ConsoleCommand::Cancel => handle.cancel_identity().await,
        ConsoleCommand::ToggleSystemApps => handle.toggle_system_apps().await,

        ConsoleCommand::Resolve(address) => {
            let handle = handle.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let reply = match handle.resolve_identity(&address).await {
                    Ok(identity) => ConsoleOutput::Identity { address, identity },
                    Err(e) => ConsoleOutput::outcome("resolve", Err(e)),
                };
                let _ = replies.send(reply);
            });
            return;
        }
        ConsoleCommand::RequestIdentity(address) => {
            let handle = handle.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let result = handle.request_identity_modification(&address).await;
                let _ = replies.send(ConsoleOutput::outcome("request-identity", result));
            });
            return;
        }
        ConsoleCommand::Save { address, label } => {
            let handle = handle.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let result = handle.save_identity(address, label).await;
                let _ = replies.send(ConsoleOutput::outcome("save", result));
            });
            return;
        }

        ConsoleCommand::State | ConsoleCommand::Quit => return,
    };

    if let Err(e) = result {
        let _ = replies.send(ConsoleOutput::outcome("command", Err(e)));
    }
}

async fn write_line<W: AsyncWrite + Unpin>(
    output: &mut W,
    line: &ConsoleOutput,
) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    output.write_all(&bytes).await?;
    output.flush().await?;
    Ok(())
}
