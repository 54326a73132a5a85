//! DAO shell
//!
//! Presents a blockchain-backed organization as a navigable session: the
//! location selects an organization, its client streams state into one
//! consistent snapshot, and the console drives navigation, wallet and
//! identity intents.

mod command;
mod config;
mod connectivity;
mod console;
mod error;
mod history;
mod identity;
mod logging;
mod orchestrator;
mod paths;
mod persistence;
mod state;
mod transition;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use daoshell_connector_fixture::FixtureConnector;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::config::ShellConfig;
use crate::connectivity::{poll_connectivity, RpcProbe};
use crate::console::ConsoleExit;
use crate::history::MemoryHistory;
use crate::orchestrator::OrchestratorOptions;
use crate::persistence::{
    create_persistence_channel, load_flag, PersistenceWriter, SYSTEM_APPS_OPENED_KEY,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "daoshell")]
#[command(about = "Session shell for blockchain-backed organizations", long_about = None)]
struct Cli {
    /// Data directory (config, preferences, logs)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Default provider handed to organization clients
    #[arg(long, env = "DAOSHELL_PROVIDER")]
    provider: Option<String>,

    /// Injected wallet provider
    #[arg(long, env = "DAOSHELL_WALLET_PROVIDER")]
    wallet_provider: Option<String>,

    /// Directory of `<dao>.json` organization fixtures
    #[arg(long, env = "DAOSHELL_FIXTURES_DIR")]
    fixtures_dir: Option<PathBuf>,

    /// Wallet account active at start
    #[arg(long)]
    account: Option<String>,

    /// Skip polling the default provider
    #[arg(long)]
    no_connectivity: bool,

    /// Initial location
    #[arg(default_value = "/")]
    path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = paths::init_data_dir(cli.data_dir.as_deref())?;
    paths::ensure_dirs()?;
    let logging = logging::init_logging(&paths::log_dir())?;

    let mut config = ShellConfig::load(&paths::config_path())?;
    if let Some(provider) = cli.provider {
        config.default_provider = provider;
    }
    if cli.wallet_provider.is_some() {
        config.wallet_provider = cli.wallet_provider;
    }
    if cli.fixtures_dir.is_some() {
        config.fixtures_dir = cli.fixtures_dir;
    }

    info!(
        component = "shell",
        event = "shell.starting",
        run_id = %logging.run_id,
        data_dir = %data_dir.display(),
        provider = %config.default_provider,
        path = %cli.path,
        "Starting DAO shell"
    );

    let system_apps_opened = match load_flag(paths::db_path(), SYSTEM_APPS_OPENED_KEY).await {
        Ok(value) => value,
        Err(e) => {
            warn!(
                component = "shell",
                event = "shell.preferences_unreadable",
                error = %e,
            );
            false
        }
    };

    let (persist_tx, persist_rx) = create_persistence_channel();
    tokio::spawn(PersistenceWriter::new(persist_rx, paths::db_path()).run());

    let connector = FixtureConnector::new(config.fixtures_dir(&data_dir), config.name_suffix.clone());
    let handle = orchestrator::spawn(
        OrchestratorOptions {
            settings: config.settings(),
            provider: config.default_provider.clone(),
            wallet_provider: config.wallet_provider.clone(),
            identity_retry: config.identity_retry(),
            system_apps_opened,
            persist_tx: Some(persist_tx),
        },
        Arc::new(connector),
        Box::new(MemoryHistory::new(&cli.path)),
    );

    info!(
        component = "shell",
        event = "shell.orchestrator_spawned",
        session_id = %handle.id,
    );

    if cli.account.is_some() {
        handle.set_wallet_account(cli.account).await?;
    }

    if !cli.no_connectivity {
        let probe = RpcProbe::new(config.default_provider.clone(), PROBE_TIMEOUT)?;
        tokio::spawn(poll_connectivity(
            probe,
            config.connectivity_poll(),
            handle.clone(),
        ));
    }

    let exit = console::run(
        handle,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    match exit {
        ConsoleExit::Fatal(message) => {
            error!(
                component = "shell",
                event = "shell.fatal",
                error = %message,
            );
            anyhow::bail!("organization failed to load: {message}")
        }
        ConsoleExit::Quit | ConsoleExit::EndOfInput => {
            info!(component = "shell", event = "shell.stopped");
            Ok(())
        }
    }
}
