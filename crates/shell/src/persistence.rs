//! Persistence layer - preferences in SQLite
//!
//! Uses `spawn_blocking` for async-safe SQLite access. Writes go through a
//! channel drained by [`PersistenceWriter`].

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Key of the system-apps panel open/closed flag
pub const SYSTEM_APPS_OPENED_KEY: &str = "SYSTEM_APPS_OPENED_STATE";

/// Commands that can be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCommand {
    /// Store a boolean preference
    SetFlag { key: String, value: bool },
}

/// Persistence writer that applies commands in order
pub struct PersistenceWriter {
    rx: mpsc::Receiver<PersistCommand>,
    db_path: PathBuf,
}

impl PersistenceWriter {
    pub fn new(rx: mpsc::Receiver<PersistCommand>, db_path: PathBuf) -> Self {
        Self { rx, db_path }
    }

    /// Run the persistence writer (call from tokio::spawn). Returns once
    /// every sender is gone.
    pub async fn run(mut self) {
        info!(
            component = "persistence",
            event = "persistence.started",
            db_path = %self.db_path.display(),
        );

        while let Some(cmd) = self.rx.recv().await {
            let db_path = self.db_path.clone();
            let result =
                tokio::task::spawn_blocking(move || execute_command(&db_path, cmd)).await;

            match result {
                Ok(Ok(())) => {
                    debug!(component = "persistence", event = "persistence.written");
                }
                Ok(Err(e)) => {
                    error!(
                        component = "persistence",
                        event = "persistence.write_failed",
                        error = %e,
                    );
                }
                Err(e) => {
                    error!(
                        component = "persistence",
                        event = "persistence.task_panicked",
                        error = %e,
                    );
                }
            }
        }
    }
}

fn open(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         CREATE TABLE IF NOT EXISTS preferences (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );",
    )?;
    Ok(conn)
}

fn execute_command(db_path: &Path, cmd: PersistCommand) -> Result<(), rusqlite::Error> {
    let conn = open(db_path)?;
    match cmd {
        PersistCommand::SetFlag { key, value } => {
            conn.execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, if value { "1" } else { "0" }],
            )?;
        }
    }
    Ok(())
}

/// Read a boolean preference. Missing keys read as `false`.
pub async fn load_flag(db_path: PathBuf, key: &str) -> anyhow::Result<bool> {
    let key = key.to_string();
    let value = tokio::task::spawn_blocking(move || -> Result<Option<String>, rusqlite::Error> {
        let conn = open(&db_path)?;
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
    })
    .await??;

    Ok(value.as_deref() == Some("1"))
}

/// Create a sender for the persistence writer
pub fn create_persistence_channel() -> (mpsc::Sender<PersistCommand>, mpsc::Receiver<PersistCommand>)
{
    mpsc::channel(64)
}
