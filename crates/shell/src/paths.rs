//! Central path resolution for all shell data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `DAOSHELL_DATA_DIR` env > `~/.daoshell`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

fn default_data_dir() -> io::Result<PathBuf> {
    if let Ok(env_val) = std::env::var("DAOSHELL_DATA_DIR") {
        return Ok(PathBuf::from(env_val));
    }
    dirs::home_dir()
        .map(|home| home.join(".daoshell"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME directory not found"))
}

/// Initialize the global data directory. Returns the resolved path.
pub fn init_data_dir(explicit: Option<&Path>) -> io::Result<PathBuf> {
    let dir = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_data_dir()?,
    };

    let mut guard = DATA_DIR.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(dir.clone());
    Ok(dir)
}

/// Return the current data directory.
///
/// Falls back to the default location when `init_data_dir` hasn't been
/// called, and to the temp dir when not even that resolves.
pub fn data_dir() -> PathBuf {
    let current = DATA_DIR.read().unwrap_or_else(|e| e.into_inner()).clone();
    current
        .or_else(|| default_data_dir().ok())
        .unwrap_or_else(|| std::env::temp_dir().join("daoshell"))
}

pub fn db_path() -> PathBuf {
    data_dir().join("daoshell.db")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = data_dir();
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(log_dir())?;
    Ok(())
}
