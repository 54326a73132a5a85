//! Scripted organization clients for orchestrator tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daoshell_connector_core::{
    ConnectRequest, ConnectorError, EventSink, OrgClient, OrgConnector, OrgEvent, Responder,
};
use daoshell_protocol::{AddressIdentity, SessionSnapshot};
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::history::MemoryHistory;
use crate::orchestrator::{self, OrchestratorHandle, OrchestratorOptions};
use crate::transition::Settings;

const WAIT_LIMIT: Duration = Duration::from_secs(2);

type Log = Arc<Mutex<Vec<String>>>;

pub struct MockClient {
    pub dao: String,
    log: Log,
    events: EventSink,
    cancelled: AtomicBool,
    accounts: Mutex<Vec<Vec<String>>>,
    identities: Mutex<HashMap<String, AddressIdentity>>,
    write_error: Mutex<Option<String>>,
    read_error: Mutex<Option<String>>,
}

impl MockClient {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Every `set_accounts` call, oldest first
    pub fn account_calls(&self) -> Vec<Vec<String>> {
        self.accounts.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, message: &str) {
        *self.write_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_reads(&self, message: &str) {
        *self.read_error.lock().unwrap() = Some(message.to_string());
    }
}

impl OrgClient for MockClient {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("cancel {}", self.dao));
    }

    fn set_accounts(&self, accounts: Vec<String>) {
        self.accounts.lock().unwrap().push(accounts);
    }

    fn modify_address_identity(
        &self,
        address: &str,
        identity: AddressIdentity,
    ) -> BoxFuture<'static, Result<(), ConnectorError>> {
        let result = match self.write_error.lock().unwrap().clone() {
            Some(message) => Err(ConnectorError::Identity(message)),
            None => {
                self.identities
                    .lock()
                    .unwrap()
                    .insert(address.to_string(), identity);
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn resolve_address_identity(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<Option<AddressIdentity>, ConnectorError>> {
        let result = match self.read_error.lock().unwrap().clone() {
            Some(message) => Err(ConnectorError::Identity(message)),
            None => Ok(self.identities.lock().unwrap().get(address).cloned()),
        };
        Box::pin(async move { result })
    }

    fn request_address_identity_modification(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<(), ConnectorError>> {
        let (responder, rx) = Responder::channel();
        let sent = self.events.emit(OrgEvent::IdentityIntent {
            address: address.to_string(),
            responder,
        });
        Box::pin(async move {
            if !sent {
                return Err(ConnectorError::ChannelClosed);
            }
            rx.await.map_err(|_| ConnectorError::ChannelClosed)?
        })
    }
}

#[derive(Default)]
struct MockState {
    gates: HashMap<String, oneshot::Receiver<Result<(), String>>>,
    sinks: Vec<(String, EventSink)>,
    clients: Vec<Arc<MockClient>>,
    identities: HashMap<String, AddressIdentity>,
}

/// Connector whose constructions can be held open until the test releases
/// them. Records `connect <dao>` / `cancel <dao>` in call order.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    log: Log,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the next construction for `dao` until the sender fires.
    pub fn gate(&self, dao: &str) -> oneshot::Sender<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().gates.insert(dao.to_string(), rx);
        tx
    }

    /// Identity known to every client built afterwards
    pub fn add_identity(&self, address: &str, name: &str) {
        self.state.lock().unwrap().identities.insert(
            address.to_string(),
            AddressIdentity {
                name: name.to_string(),
            },
        );
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Latest client built for `dao`
    pub fn client(&self, dao: &str) -> Option<Arc<MockClient>> {
        let state = self.state.lock().unwrap();
        state.clients.iter().rev().find(|c| c.dao == dao).cloned()
    }

    /// Event sink handed to the latest construction for `dao`
    pub fn sink(&self, dao: &str) -> Option<EventSink> {
        let state = self.state.lock().unwrap();
        state
            .sinks
            .iter()
            .rev()
            .find(|(d, _)| d == dao)
            .map(|(_, sink)| sink.clone())
    }
}

impl OrgConnector for MockConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<Arc<dyn OrgClient>, ConnectorError>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("connect {}", request.dao));
        let gate = {
            let mut state = self.state.lock().unwrap();
            state
                .sinks
                .push((request.dao.clone(), request.events.clone()));
            state.gates.remove(&request.dao)
        };
        let state = self.state.clone();
        let log = self.log.clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                match gate.await {
                    Ok(Ok(())) => {}
                    Ok(Err(reason)) => {
                        return Err(ConnectorError::ConnectFailed {
                            dao: request.dao,
                            reason,
                        })
                    }
                    Err(_) => return Err(ConnectorError::ChannelClosed),
                }
            }
            let mut state = state.lock().unwrap();
            let client = Arc::new(MockClient {
                dao: request.dao,
                log,
                events: request.events,
                cancelled: AtomicBool::new(false),
                accounts: Mutex::new(Vec::new()),
                identities: Mutex::new(state.identities.clone()),
                write_error: Mutex::new(None),
                read_error: Mutex::new(None),
            });
            state.clients.push(client.clone());
            Ok(client as Arc<dyn OrgClient>)
        })
    }
}

pub fn settings() -> Settings {
    Settings {
        name_suffix: "aragonid.eth".to_string(),
        known_app_ids: ["0xvoting".to_string()].into_iter().collect(),
    }
}

pub fn options() -> OrchestratorOptions {
    OrchestratorOptions {
        settings: settings(),
        provider: "http://localhost:8545".to_string(),
        wallet_provider: None,
        identity_retry: Duration::from_millis(10),
        system_apps_opened: false,
        persist_tx: None,
    }
}

pub fn spawn_at(
    path: &str,
    connector: &MockConnector,
    options: OrchestratorOptions,
) -> (OrchestratorHandle, MemoryHistory) {
    let history = MemoryHistory::new(path);
    let handle = orchestrator::spawn(
        options,
        Arc::new(connector.clone()),
        Box::new(history.clone()),
    );
    (handle, history)
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for<F>(handle: &OrchestratorHandle, pred: F) -> Arc<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let mut updates = handle.subscribe();
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let snapshot = handle.snapshot();
            if pred(&snapshot) {
                return snapshot;
            }
            let _ = updates.recv().await;
        }
    })
    .await
    .expect("snapshot condition not reached")
}

/// Poll a condition outside the snapshot stream.
pub async fn eventually<F>(pred: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT_LIMIT, async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// True once the loaded organization is `dao` and its client is adopted
pub fn loaded(dao: &'static str) -> impl Fn(&SessionSnapshot) -> bool {
    move |snapshot| {
        snapshot.client_loaded
            && snapshot
                .locator
                .as_ref()
                .and_then(|l| l.dao.as_deref())
                == Some(dao)
    }
}
