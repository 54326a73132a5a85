//! Organization client contract
//!
//! An organization client connects to a DAO and streams its state back as
//! [`OrgEvent`]s. The orchestrator only ever talks to clients through the
//! [`OrgConnector`] and [`OrgClient`] traits defined here.

use std::fmt;
use std::sync::Arc;

use daoshell_protocol::{
    AddressIdentity, AppIdentifiers, AppInstance, DaoAddress, Permissions, RepoInfo, SignatureBag,
    TransactionBag,
};
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Errors that can occur in organization clients
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Failed to connect to {dao}: {reason}")]
    ConnectFailed { dao: String, reason: String },

    #[error("Organization not found: {0}")]
    DaoNotFound(String),

    #[error("Identity modification cancelled")]
    IdentityModificationCancelled,

    #[error("Can’t change the path of {app_address}: the app is not currently active.")]
    InactiveApp { app_address: String },

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Client cancelled")]
    Cancelled,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One-shot answer slot for a request raised by the client.
///
/// Dropping a responder without answering makes the requester observe
/// `ChannelClosed`; callers are expected to always resolve or reject.
pub struct Responder<T> {
    tx: oneshot::Sender<Result<T, ConnectorError>>,
}

impl<T> Responder<T> {
    pub fn channel() -> (Self, oneshot::Receiver<Result<T, ConnectorError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: ConnectorError) {
        self.settle(Err(error));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn settle(self, result: Result<T, ConnectorError>) {
        if self.tx.send(result).is_err() {
            debug!(
                component = "connector",
                event = "responder.requester_gone",
                "Requester dropped before the answer arrived"
            );
        }
    }
}

impl<T> fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Events emitted by organization clients
#[derive(Debug)]
pub enum OrgEvent {
    /// Organization identity resolved
    DaoAddress(DaoAddress),

    /// Provider the client ended up using
    Web3 { endpoint: String },

    /// Installed app instances (full list)
    Apps(Vec<AppInstance>),

    /// Role → grantees mapping (full map)
    Permissions(Permissions),

    /// Proxy addresses able to forward actions
    Forwarders(Vec<String>),

    /// Proxy address → label (full map)
    AppIdentifiers(AppIdentifiers),

    /// Installed repos with their versions (full list)
    InstalledRepos(Vec<RepoInfo>),

    /// Latest batch of pending transactions
    Transaction(TransactionBag),

    /// Latest off-chain signature request
    Signatures(SignatureBag),

    /// An app wants the user to edit the label of `address`
    IdentityIntent {
        address: String,
        responder: Responder<()>,
    },

    /// An app wants to change the visible path inside its own section
    RequestPath {
        app_address: String,
        path: String,
        responder: Responder<()>,
    },
}

impl OrgEvent {
    /// Stable name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            OrgEvent::DaoAddress(_) => "dao_address",
            OrgEvent::Web3 { .. } => "web3",
            OrgEvent::Apps(_) => "apps",
            OrgEvent::Permissions(_) => "permissions",
            OrgEvent::Forwarders(_) => "forwarders",
            OrgEvent::AppIdentifiers(_) => "app_identifiers",
            OrgEvent::InstalledRepos(_) => "installed_repos",
            OrgEvent::Transaction(_) => "transaction",
            OrgEvent::Signatures(_) => "signatures",
            OrgEvent::IdentityIntent { .. } => "identity_intent",
            OrgEvent::RequestPath { .. } => "request_path",
        }
    }
}

/// Where a client delivers its events. Never blocks.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OrgEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<OrgEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Returns false once the orchestrator stopped listening.
    pub fn emit(&self, event: OrgEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Everything a connector needs to bring up a client for one DAO
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub dao: String,
    pub provider: String,
    pub wallet_account: Option<String>,
    pub wallet_provider: Option<String>,
    pub events: EventSink,
}

/// Builds organization clients.
pub trait OrgConnector: Send + Sync + 'static {
    /// Connect to `request.dao`. Resolves once the client is usable; events
    /// may start flowing into `request.events` before that.
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<Arc<dyn OrgClient>, ConnectorError>>;
}

/// A live connection to one organization.
pub trait OrgClient: Send + Sync + 'static {
    /// Stop all subscriptions. No events are emitted afterwards.
    fn cancel(&self);

    fn set_accounts(&self, accounts: Vec<String>);

    fn modify_address_identity(
        &self,
        address: &str,
        identity: AddressIdentity,
    ) -> BoxFuture<'static, Result<(), ConnectorError>>;

    fn resolve_address_identity(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<Option<AddressIdentity>, ConnectorError>>;

    /// Ask the client to raise an identity intent for `address`. Completes
    /// when that intent is saved or cancelled.
    fn request_address_identity_modification(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<(), ConnectorError>>;
}
