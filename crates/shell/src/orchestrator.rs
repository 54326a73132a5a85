//! Session orchestrator actor
//!
//! One tokio task owns the [`SessionState`] and processes commands
//! sequentially. Location changes from the [`History`], intents from
//! [`OrchestratorHandle`]s, and organization client events all end up as
//! [`Input`]s to the pure [`transition`] function; the actor executes the
//! effects it returns. Lock-free reads go through `ArcSwap`.
//!
//! Every client construction runs under a generation number. Results and
//! events carry the generation they were started under, so anything from a
//! superseded construction is discarded instead of applied.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use daoshell_connector_core::{
    ConnectRequest, ConnectorError, EventSink, OrgClient, OrgConnector, OrgEvent, Responder,
};
use daoshell_protocol::{AddressIdentity, SessionSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::command::OrchestratorCommand;
use crate::error::ShellError;
use crate::history::{History, Location};
use crate::identity::IdentityResolver;
use crate::persistence::{PersistCommand, SYSTEM_APPS_OPENED_KEY};
use crate::state::SessionState;
use crate::transition::{
    transition, Effect, HistoryOp, Input, IntentRejection, OrgUpdate, Settings,
};

const COMMAND_BUFFER: usize = 256;
const UPDATE_BUFFER: usize = 64;

pub struct OrchestratorOptions {
    pub settings: Settings,
    /// Default provider handed to every client
    pub provider: String,
    pub wallet_provider: Option<String>,
    /// How long an identity lookup waits before re-checking for a client
    pub identity_retry: Duration,
    /// Persisted system-apps panel flag
    pub system_apps_opened: bool,
    pub persist_tx: Option<mpsc::Sender<PersistCommand>>,
}

/// Handle to the running orchestrator (cheap to Clone).
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub id: String,
    command_tx: mpsc::Sender<OrchestratorCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    updates: broadcast::Sender<Arc<SessionSnapshot>>,
    identity: IdentityResolver,
}

impl OrchestratorHandle {
    async fn send(&self, command: OrchestratorCommand) -> Result<(), ShellError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ShellError::OrchestratorGone)
    }

    /// Push `path` unless it is already the current location.
    pub async fn navigate(&self, path: impl Into<String>) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::Navigate { path: path.into() })
            .await
    }

    pub async fn navigate_back(&self) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::NavigateBack).await
    }

    pub async fn open_preferences(
        &self,
        screen: impl Into<String>,
        data: Option<(String, String)>,
    ) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::OpenPreferences {
            screen: screen.into(),
            data,
        })
        .await
    }

    pub async fn close_preferences(&self) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::ClosePreferences).await
    }

    pub async fn set_wallet_account(&self, account: Option<String>) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::SetWalletAccount { account })
            .await
    }

    pub async fn set_connected(&self, connected: bool) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::SetConnected { connected })
            .await
    }

    pub async fn cancel_identity(&self) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::CancelIdentity).await
    }

    /// Write the label for the pending identity intent and settle it.
    pub async fn save_identity(
        &self,
        address: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<(), ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorCommand::SaveIdentity {
            address: address.into(),
            label: label.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ShellError::OrchestratorGone)?
    }

    /// Look up the identity of `address`. Waits for a client when the
    /// organization is still connecting.
    pub async fn resolve_identity(
        &self,
        address: &str,
    ) -> Result<Option<AddressIdentity>, ShellError> {
        Ok(self.identity.resolve(address).await?)
    }

    /// Ask the client to raise an identity intent for `address`. Completes
    /// once that intent is saved or cancelled.
    pub async fn request_identity_modification(&self, address: &str) -> Result<(), ShellError> {
        let client = self.identity.current().ok_or(ShellError::NotConnected)?;
        Ok(client.request_address_identity_modification(address).await?)
    }

    pub async fn toggle_system_apps(&self) -> Result<(), ShellError> {
        self.send(OrchestratorCommand::ToggleSystemApps).await
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    /// Every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionSnapshot>> {
        self.updates.subscribe()
    }

    /// Snapshot after every command sent before this call has been applied.
    pub async fn state(&self) -> Result<Arc<SessionSnapshot>, ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorCommand::GetSnapshot { reply }).await?;
        rx.await.map_err(|_| ShellError::OrchestratorGone)
    }
}

/// Spawn the orchestrator. The history's current location is applied
/// before anything else.
pub fn spawn(
    options: OrchestratorOptions,
    connector: Arc<dyn OrgConnector>,
    mut history: Box<dyn History>,
) -> OrchestratorHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (nav_tx, nav_rx) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = watch::channel(None);
    let (generation_tx, _) = watch::channel(0);
    let (updates, _) = broadcast::channel(UPDATE_BUFFER);

    let state = SessionState::new(options.system_apps_opened);
    let snapshot = Arc::new(ArcSwap::from_pointee(state.snapshot()));
    let resolver = IdentityResolver::new(client_rx, options.identity_retry);

    let initial = history.location();
    history.listen(nav_tx.clone());
    let _ = nav_tx.send(initial);

    let actor = Orchestrator {
        state,
        settings: options.settings,
        provider: options.provider,
        wallet_provider: options.wallet_provider,
        connector,
        history,
        client: None,
        client_tx,
        generation_tx,
        forwarder: None,
        pending_intent: None,
        resolver: resolver.clone(),
        self_tx: command_tx.downgrade(),
        snapshot: snapshot.clone(),
        updates: updates.clone(),
        persist_tx: options.persist_tx,
    };
    let id = daoshell_protocol::new_id();
    let span = info_span!("orchestrator", session_id = %id);
    tokio::spawn(actor.run(command_rx, nav_rx).instrument(span));

    OrchestratorHandle {
        id,
        command_tx,
        snapshot,
        updates,
        identity: resolver,
    }
}

/// Values an input brings along that effects consume
#[derive(Default)]
struct Pending {
    client: Option<Arc<dyn OrgClient>>,
    path_responder: Option<Responder<()>>,
    intent: Option<Responder<()>>,
}

impl Pending {
    /// Nothing handed to the actor is left without an outcome.
    fn settle(self) {
        if let Some(client) = self.client {
            client.cancel();
        }
        if let Some(responder) = self.path_responder {
            responder.reject(ConnectorError::ChannelClosed);
        }
        if let Some(responder) = self.intent {
            responder.reject(ConnectorError::IdentityModificationCancelled);
        }
    }
}

struct Orchestrator {
    state: SessionState,
    settings: Settings,
    provider: String,
    wallet_provider: Option<String>,
    connector: Arc<dyn OrgConnector>,
    history: Box<dyn History>,
    /// Adopted client of the current generation
    client: Option<Arc<dyn OrgClient>>,
    client_tx: watch::Sender<Option<Arc<dyn OrgClient>>>,
    generation_tx: watch::Sender<u64>,
    /// Moves client events of the current generation into the command channel
    forwarder: Option<JoinHandle<()>>,
    pending_intent: Option<Responder<()>>,
    resolver: IdentityResolver,
    self_tx: mpsc::WeakSender<OrchestratorCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    updates: broadcast::Sender<Arc<SessionSnapshot>>,
    persist_tx: Option<mpsc::Sender<PersistCommand>>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<OrchestratorCommand>,
        mut nav_rx: mpsc::UnboundedReceiver<Location>,
    ) {
        info!(
            component = "orchestrator",
            event = "orchestrator.started",
            "Session orchestrator started"
        );

        loop {
            // Location changes first, so every intent sees the locator its
            // predecessors produced.
            tokio::select! {
                biased;
                Some(location) = nav_rx.recv() => {
                    self.apply(Input::Navigated(location), Pending::default());
                }
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }

            if let Some(fatal) = &self.state.fatal_error {
                error!(
                    component = "orchestrator",
                    event = "orchestrator.fatal",
                    error = %fatal,
                    "Organization failed to load, stopping"
                );
                break;
            }
        }

        self.teardown_client();
        info!(
            component = "orchestrator",
            event = "orchestrator.stopped",
            "Session orchestrator stopped"
        );
    }

    fn handle_command(&mut self, command: OrchestratorCommand) {
        debug!(
            component = "orchestrator",
            event = "orchestrator.command",
            command = command.name(),
        );

        match command {
            OrchestratorCommand::Navigate { path } => {
                self.apply(Input::Navigate(path), Pending::default())
            }
            OrchestratorCommand::NavigateBack => {
                self.apply(Input::NavigateBack, Pending::default())
            }
            OrchestratorCommand::OpenPreferences { screen, data } => self.apply(
                Input::OpenPreferences { screen, data },
                Pending::default(),
            ),
            OrchestratorCommand::ClosePreferences => {
                self.apply(Input::ClosePreferences, Pending::default())
            }
            OrchestratorCommand::CancelIdentity => {
                self.apply(Input::CancelIdentity, Pending::default())
            }
            OrchestratorCommand::ToggleSystemApps => {
                self.apply(Input::ToggleSystemApps, Pending::default())
            }
            OrchestratorCommand::SetWalletAccount { account } => {
                self.apply(Input::WalletAccountChanged(account), Pending::default())
            }
            OrchestratorCommand::SetConnected { connected } => {
                self.apply(Input::ConnectivityChanged(connected), Pending::default())
            }
            OrchestratorCommand::GetSnapshot { reply } => {
                let _ = reply.send(self.snapshot.load_full());
            }

            OrchestratorCommand::SaveIdentity {
                address,
                label,
                reply,
            } => self.save_identity(address, label, reply),

            OrchestratorCommand::IdentityWritten {
                generation,
                result,
                reply,
            } => {
                let error = result.as_ref().err().map(ToString::to_string);
                self.apply(
                    Input::IdentityWriteFinished { generation, error },
                    Pending::default(),
                );
                let _ = reply.send(result.map_err(ShellError::from));
            }

            OrchestratorCommand::ClientReady { generation, result } => match result {
                Ok(client) => self.apply(
                    Input::ClientConnected { generation },
                    Pending {
                        client: Some(client),
                        ..Pending::default()
                    },
                ),
                Err(err) => {
                    warn!(
                        component = "orchestrator",
                        event = "client.connect_failed",
                        generation,
                        error = %err,
                        "Organization client failed to connect"
                    );
                    self.apply(
                        Input::ClientFailed {
                            generation,
                            error: err.to_string(),
                        },
                        Pending::default(),
                    )
                }
            },

            OrchestratorCommand::OrgEvent { generation, event } => {
                self.handle_org_event(generation, event)
            }

            OrchestratorCommand::IdentityIntentReady {
                generation,
                address,
                label,
                responder,
            } => self.apply(
                Input::IdentityIntentOpened {
                    generation,
                    address,
                    label,
                },
                Pending {
                    intent: Some(responder),
                    ..Pending::default()
                },
            ),
        }
    }

    fn handle_org_event(&mut self, generation: u64, event: OrgEvent) {
        debug!(
            component = "orchestrator",
            event = "org.callback",
            callback = event.name(),
            generation,
            current_generation = self.state.generation,
        );

        match &event {
            OrgEvent::Web3 { endpoint } => info!(
                component = "orchestrator",
                event = "org.web3",
                endpoint = %endpoint,
                "Client provider ready"
            ),
            OrgEvent::Forwarders(forwarders) => debug!(
                component = "orchestrator",
                event = "org.forwarders",
                count = forwarders.len(),
            ),
            _ => {}
        }

        match OrgUpdate::try_from(event) {
            Ok(update) => self.apply(Input::Org { generation, update }, Pending::default()),
            Err(OrgEvent::RequestPath {
                app_address,
                path,
                responder,
            }) => self.apply(
                Input::PathRequested {
                    generation,
                    app_address,
                    path,
                },
                Pending {
                    path_responder: Some(responder),
                    ..Pending::default()
                },
            ),
            Err(OrgEvent::IdentityIntent { address, responder }) => {
                self.prefill_identity_intent(generation, address, responder)
            }
            Err(other) => warn!(
                component = "orchestrator",
                event = "org.unhandled",
                callback = other.name(),
            ),
        }
    }

    /// Look up the current label of `address`, then open the intent.
    /// Lookup failures leave the label empty.
    fn prefill_identity_intent(
        &mut self,
        generation: u64,
        address: String,
        responder: Responder<()>,
    ) {
        let resolver = self.resolver.clone();
        let generation_rx = self.generation_tx.subscribe();
        let self_tx = self.self_tx.clone();

        tokio::spawn(async move {
            let label = tokio::select! {
                result = resolver.resolve(&address) => match result {
                    Ok(identity) => identity.map(|identity| identity.name),
                    Err(err) => {
                        debug!(
                            component = "orchestrator",
                            event = "identity.prefill_failed",
                            address = %address,
                            error = %err,
                        );
                        None
                    }
                },
                _ = superseded(generation_rx, generation) => None,
            };

            let command = OrchestratorCommand::IdentityIntentReady {
                generation,
                address,
                label,
                responder,
            };
            if let Some(OrchestratorCommand::IdentityIntentReady { responder, .. }) =
                deliver(&self_tx, command).await
            {
                responder.reject(ConnectorError::IdentityModificationCancelled);
            }
        });
    }

    fn save_identity(
        &mut self,
        address: String,
        label: String,
        reply: oneshot::Sender<Result<(), ShellError>>,
    ) {
        if self.state.dao.identity_intent.is_none() {
            let _ = reply.send(Err(ShellError::NoIdentityIntent));
            return;
        }
        let Some(client) = self.client.clone() else {
            let _ = reply.send(Err(ShellError::NotConnected));
            return;
        };

        let generation = self.state.generation;
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = client
                .modify_address_identity(&address, AddressIdentity { name: label })
                .await;
            deliver(
                &self_tx,
                OrchestratorCommand::IdentityWritten {
                    generation,
                    result,
                    reply,
                },
            )
            .await;
        });
    }

    // -- Reducer plumbing -------------------------------------------------------

    fn apply(&mut self, input: Input, mut pending: Pending) {
        let (mut next, effects) = transition(self.state.clone(), input, &self.settings);
        let changed = next != self.state;
        if changed {
            next.revision += 1;
        }
        let generation_changed = next.generation != self.state.generation;
        self.state = next;

        if generation_changed {
            self.generation_tx.send_replace(self.state.generation);
        }

        for effect in effects {
            self.run_effect(effect, &mut pending);
        }
        pending.settle();

        // After effects, so a published `client_loaded` always has a client in the slot.
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.state.snapshot());
        self.snapshot.store(snapshot.clone());
        let _ = self.updates.send(snapshot);
    }

    fn run_effect(&mut self, effect: Effect, pending: &mut Pending) {
        match effect {
            Effect::TeardownClient => self.teardown_client(),

            Effect::Connect { generation, dao } => self.connect(generation, dao),

            Effect::AdoptClient => {
                if let Some(client) = pending.client.take() {
                    info!(
                        component = "orchestrator",
                        event = "client.adopted",
                        generation = self.state.generation,
                        "Organization client connected"
                    );
                    self.client = Some(client.clone());
                    self.client_tx.send_replace(Some(client));
                }
            }

            Effect::DiscardClient => {
                if let Some(client) = pending.client.take() {
                    info!(
                        component = "orchestrator",
                        event = "client.discarded",
                        "Discarding client from a superseded construction"
                    );
                    client.cancel();
                }
            }

            Effect::SetAccounts(accounts) => {
                if let Some(client) = &self.client {
                    debug!(
                        component = "orchestrator",
                        event = "client.set_accounts",
                        count = accounts.len(),
                    );
                    client.set_accounts(accounts);
                }
            }

            Effect::History(op) => match op {
                HistoryOp::Push(path) => self.history.push(&path),
                HistoryOp::Replace(location) => self.history.replace(location),
                HistoryOp::Back => self.history.go_back(),
            },

            Effect::ResolvePathRequest => {
                if let Some(responder) = pending.path_responder.take() {
                    responder.resolve(());
                }
            }

            Effect::RejectPathRequest { app_address } => {
                warn!(
                    component = "orchestrator",
                    event = "path_request.rejected",
                    app_address = %app_address,
                    "Path change requested by an inactive app"
                );
                if let Some(responder) = pending.path_responder.take() {
                    responder.reject(ConnectorError::InactiveApp { app_address });
                }
            }

            Effect::HoldIdentityIntent => {
                if let Some(responder) = pending.intent.take() {
                    if let Some(superseded) = self.pending_intent.replace(responder) {
                        superseded.reject(ConnectorError::IdentityModificationCancelled);
                    }
                }
            }

            Effect::DropIdentityIntent => {
                if let Some(responder) = pending.intent.take() {
                    responder.reject(ConnectorError::IdentityModificationCancelled);
                }
            }

            Effect::ResolveIdentityIntent => {
                if let Some(responder) = self.pending_intent.take() {
                    responder.resolve(());
                }
            }

            Effect::RejectIdentityIntent(reason) => {
                if let Some(responder) = self.pending_intent.take() {
                    responder.reject(match reason {
                        IntentRejection::Cancelled => {
                            ConnectorError::IdentityModificationCancelled
                        }
                        IntentRejection::WriteFailed(message) => ConnectorError::Identity(message),
                    });
                }
            }

            Effect::PersistSystemAppsOpened(value) => {
                if let Some(persist_tx) = &self.persist_tx {
                    let command = PersistCommand::SetFlag {
                        key: SYSTEM_APPS_OPENED_KEY.to_string(),
                        value,
                    };
                    if persist_tx.try_send(command).is_err() {
                        warn!(
                            component = "orchestrator",
                            event = "persist.dropped",
                            "Persistence channel full or closed"
                        );
                    }
                }
            }
        }
    }

    // -- Client lifecycle -------------------------------------------------------

    fn connect(&mut self, generation: u64, dao: String) {
        info!(
            component = "orchestrator",
            event = "client.connect",
            dao = %dao,
            generation,
            "Connecting to organization"
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            dao,
            provider: self.provider.clone(),
            wallet_account: self.state.wallet_account.clone(),
            wallet_provider: self.wallet_provider.clone(),
            events: EventSink::new(event_tx),
        };
        let construction = self.connector.connect(request);

        let self_tx = self.self_tx.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let command = OrchestratorCommand::OrgEvent { generation, event };
                if deliver(&self_tx, command).await.is_some() {
                    break;
                }
            }
        }));

        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = construction.await;
            let command = OrchestratorCommand::ClientReady { generation, result };
            if let Some(OrchestratorCommand::ClientReady {
                result: Ok(client), ..
            }) = deliver(&self_tx, command).await
            {
                client.cancel();
            }
        });
    }

    /// Cancel the current client and stop delivery of its events.
    fn teardown_client(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(client) = self.client.take() {
            info!(
                component = "orchestrator",
                event = "client.teardown",
                "Cancelling organization client"
            );
            client.cancel();
        }
        self.client_tx.send_replace(None);
        if let Some(responder) = self.pending_intent.take() {
            responder.reject(ConnectorError::IdentityModificationCancelled);
        }
    }
}

/// Completes once the session moves past `generation`.
async fn superseded(mut generation_rx: watch::Receiver<u64>, generation: u64) {
    loop {
        let current = *generation_rx.borrow_and_update();
        if current != generation || generation_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Send a command to the actor from one of its tasks. Hands the command
/// back when the actor is gone.
async fn deliver(
    self_tx: &mpsc::WeakSender<OrchestratorCommand>,
    command: OrchestratorCommand,
) -> Option<OrchestratorCommand> {
    match self_tx.upgrade() {
        Some(tx) => tx.send(command).await.err().map(|err| err.0),
        None => Some(command),
    }
}
