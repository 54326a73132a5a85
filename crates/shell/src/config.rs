//! Shell configuration
//!
//! Built-in defaults, overridden by `<data_dir>/config.toml` when present,
//! overridden again by command-line flags in `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transition::Settings;

const DEFAULT_PROVIDER: &str = "http://localhost:8545";
const DEFAULT_NAME_SUFFIX: &str = "aragonid.eth";

/// App ids of the core apps (voting, finance, vault, token manager, agent)
const DEFAULT_KNOWN_APP_IDS: [&str; 5] = [
    "0x9fa3927f639745e587912d4b0fea7ef9013bf93fb907d29faeab57417ba6e1d4",
    "0xbf8491150dafc5dcaee5b861414dca922de09ccffa344964ae167212e8c673ae",
    "0x7e852e0fcfce6551c13800f1e7476f982525c2b5277ba14b24339c68416336d1",
    "0x6b20a3010614eeebf2138ccec99f028a61c811b3b1a3343b6ff635985c75c91f",
    "0x9ac98dc5f995bf0211ed589ef022719d1487e5cb2bab505676f0d084c07cf89a",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Provider handed to organization clients and polled for connectivity
    pub default_provider: String,
    pub wallet_provider: Option<String>,
    /// Organization fixtures; `<data_dir>/fixtures` when unset
    pub fixtures_dir: Option<PathBuf>,
    pub identity_retry_ms: u64,
    pub connectivity_poll_secs: u64,
    pub name_suffix: String,
    pub known_app_ids: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            wallet_provider: None,
            fixtures_dir: None,
            identity_retry_ms: 100,
            connectivity_poll_secs: 10,
            name_suffix: DEFAULT_NAME_SUFFIX.to_string(),
            known_app_ids: DEFAULT_KNOWN_APP_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ShellConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn identity_retry(&self) -> Duration {
        Duration::from_millis(self.identity_retry_ms)
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_secs(self.connectivity_poll_secs)
    }

    pub fn fixtures_dir(&self, data_dir: &Path) -> PathBuf {
        self.fixtures_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("fixtures"))
    }

    pub fn settings(&self) -> Settings {
        Settings {
            name_suffix: self.name_suffix.clone(),
            known_app_ids: self
                .known_app_ids
                .iter()
                .map(|id| id.to_lowercase())
                .collect(),
        }
    }
}
