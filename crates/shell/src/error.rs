use daoshell_connector_core::ConnectorError;
use thiserror::Error;

/// Failures surfaced to callers of the orchestrator handle
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Orchestrator stopped")]
    OrchestratorGone,

    #[error("Not connected to an organization")]
    NotConnected,

    #[error("No identity intent is pending")]
    NoIdentityIntent,

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}
