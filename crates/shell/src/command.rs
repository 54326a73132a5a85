//! Commands sent to the orchestrator actor from handles and its own tasks.

use std::sync::Arc;

use daoshell_connector_core::{ConnectorError, OrgClient, OrgEvent, Responder};
use daoshell_protocol::SessionSnapshot;
use tokio::sync::oneshot;

use crate::error::ShellError;

pub enum OrchestratorCommand {
    // -- Intents from the presentation layer --
    Navigate {
        path: String,
    },
    NavigateBack,
    OpenPreferences {
        screen: String,
        data: Option<(String, String)>,
    },
    ClosePreferences,
    CancelIdentity,
    SaveIdentity {
        address: String,
        label: String,
        reply: oneshot::Sender<Result<(), ShellError>>,
    },
    ToggleSystemApps,

    // -- External sources --
    SetWalletAccount {
        account: Option<String>,
    },
    SetConnected {
        connected: bool,
    },

    // -- Queries --
    /// Snapshot after every earlier command has been applied
    GetSnapshot {
        reply: oneshot::Sender<Arc<SessionSnapshot>>,
    },

    // -- Results from tasks spawned by the actor --
    ClientReady {
        generation: u64,
        result: Result<Arc<dyn OrgClient>, ConnectorError>,
    },
    OrgEvent {
        generation: u64,
        event: OrgEvent,
    },
    IdentityIntentReady {
        generation: u64,
        address: String,
        label: Option<String>,
        responder: Responder<()>,
    },
    IdentityWritten {
        generation: u64,
        result: Result<(), ConnectorError>,
        reply: oneshot::Sender<Result<(), ShellError>>,
    },
}

impl OrchestratorCommand {
    /// Stable name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorCommand::Navigate { .. } => "navigate",
            OrchestratorCommand::NavigateBack => "navigate_back",
            OrchestratorCommand::OpenPreferences { .. } => "open_preferences",
            OrchestratorCommand::ClosePreferences => "close_preferences",
            OrchestratorCommand::CancelIdentity => "cancel_identity",
            OrchestratorCommand::SaveIdentity { .. } => "save_identity",
            OrchestratorCommand::ToggleSystemApps => "toggle_system_apps",
            OrchestratorCommand::SetWalletAccount { .. } => "set_wallet_account",
            OrchestratorCommand::SetConnected { .. } => "set_connected",
            OrchestratorCommand::GetSnapshot { .. } => "get_snapshot",
            OrchestratorCommand::ClientReady { .. } => "client_ready",
            OrchestratorCommand::OrgEvent { .. } => "org_event",
            OrchestratorCommand::IdentityIntentReady { .. } => "identity_intent_ready",
            OrchestratorCommand::IdentityWritten { .. } => "identity_written",
        }
    }
}
