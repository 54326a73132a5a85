//! Fixture connector
//!
//! Serves organizations from `<dir>/<name>.json` files. Each file describes
//! one DAO (address, apps, permissions, repos, known identities). On connect
//! the client streams the fixture back as events, one slice at a time, the
//! same way a live client reports state as it loads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use daoshell_connector_core::{
    ConnectRequest, ConnectorError, EventSink, OrgClient, OrgConnector, OrgEvent, Responder,
};
use daoshell_protocol::routing::strip_name_suffix;
use daoshell_protocol::{
    AddressIdentity, AppIdentifiers, AppInstance, DaoAddress, Permissions, RepoInfo, SignatureBag,
    TransactionBag,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// On-disk description of one organization
#[derive(Debug, Clone, Deserialize)]
pub struct OrgFixture {
    pub address: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub apps: Vec<AppInstance>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub forwarders: Vec<String>,
    #[serde(default)]
    pub app_identifiers: AppIdentifiers,
    #[serde(default)]
    pub repos: Vec<RepoInfo>,
    /// Address → label known before the session starts
    #[serde(default)]
    pub identities: HashMap<String, String>,
    #[serde(default)]
    pub transaction_bag: Option<TransactionBag>,
    #[serde(default)]
    pub signature_bag: Option<SignatureBag>,
    /// Simulated connection latency
    #[serde(default)]
    pub connect_delay_ms: u64,
    /// Pause between streamed slices
    #[serde(default)]
    pub event_interval_ms: u64,
}

/// Connector backed by a directory of fixtures
#[derive(Debug, Clone)]
pub struct FixtureConnector {
    dir: PathBuf,
    name_suffix: String,
}

impl FixtureConnector {
    pub fn new(dir: impl Into<PathBuf>, name_suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name_suffix: name_suffix.into(),
        }
    }

    fn fixture_path(&self, dao: &str) -> PathBuf {
        let name = strip_name_suffix(dao, &self.name_suffix);
        self.dir.join(format!("{name}.json"))
    }

    fn domain_for(&self, dao: &str, fixture: &OrgFixture) -> String {
        if let Some(domain) = &fixture.domain {
            return domain.clone();
        }
        if dao.starts_with("0x") || dao.contains('.') {
            dao.to_string()
        } else {
            format!("{dao}.{}", self.name_suffix)
        }
    }
}

/// Read and parse a fixture file.
pub async fn load_fixture(path: &Path, dao: &str) -> Result<OrgFixture, ConnectorError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConnectorError::DaoNotFound(dao.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

impl OrgConnector for FixtureConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<Arc<dyn OrgClient>, ConnectorError>> {
        let path = self.fixture_path(&request.dao);
        let connector = self.clone();

        Box::pin(async move {
            info!(
                component = "fixture_connector",
                event = "fixture.connect",
                dao = %request.dao,
                path = %path.display(),
                "Loading organization fixture"
            );
            let fixture = load_fixture(&path, &request.dao).await?;

            if fixture.connect_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(fixture.connect_delay_ms)).await;
            }

            let dao_address = DaoAddress {
                address: fixture.address.clone(),
                domain: connector.domain_for(&request.dao, &fixture),
            };

            let client = Arc::new(FixtureClient {
                dao: request.dao.clone(),
                events: request.events.clone(),
                cancelled: Arc::new(AtomicBool::new(false)),
                accounts: Mutex::new(request.wallet_account.into_iter().collect()),
                identities: RwLock::new(
                    fixture
                        .identities
                        .iter()
                        .map(|(address, name)| (address.to_lowercase(), name.clone()))
                        .collect(),
                ),
                stream: Mutex::new(None),
            });

            let stream = tokio::spawn(stream_fixture(
                fixture,
                dao_address,
                request.provider,
                request.events,
                client.cancelled.clone(),
            ));
            if let Ok(mut slot) = client.stream.lock() {
                *slot = Some(stream);
            }

            Ok(client as Arc<dyn OrgClient>)
        })
    }
}

async fn stream_fixture(
    fixture: OrgFixture,
    dao_address: DaoAddress,
    provider: String,
    events: EventSink,
    cancelled: Arc<AtomicBool>,
) {
    let interval = Duration::from_millis(fixture.event_interval_ms);
    let mut queue = vec![
        OrgEvent::Web3 { endpoint: provider },
        OrgEvent::DaoAddress(dao_address),
        OrgEvent::Apps(fixture.apps),
        OrgEvent::AppIdentifiers(fixture.app_identifiers),
        OrgEvent::Permissions(fixture.permissions),
        OrgEvent::Forwarders(fixture.forwarders),
        OrgEvent::InstalledRepos(fixture.repos),
    ];
    queue.extend(fixture.transaction_bag.map(OrgEvent::Transaction));
    queue.extend(fixture.signature_bag.map(OrgEvent::Signatures));

    for event in queue {
        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval).await;
        }
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let name = event.name();
        if !events.emit(event) {
            debug!(
                component = "fixture_connector",
                event = "fixture.stream.closed",
                slice = name,
                "Event sink closed, stopping stream"
            );
            return;
        }
    }
}

/// Client for one fixture-backed organization
pub struct FixtureClient {
    dao: String,
    events: EventSink,
    cancelled: Arc<AtomicBool>,
    accounts: Mutex<Vec<String>>,
    identities: RwLock<HashMap<String, String>>,
    stream: Mutex<Option<JoinHandle<()>>>,
}

impl FixtureClient {
    fn ensure_live(&self) -> Result<(), ConnectorError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ConnectorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Accounts most recently pushed by the orchestrator
    pub fn accounts(&self) -> Vec<String> {
        self.accounts
            .lock()
            .map(|accounts| accounts.clone())
            .unwrap_or_default()
    }
}

impl OrgClient for FixtureClient {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.stream.lock() {
            if let Some(stream) = slot.take() {
                stream.abort();
            }
        }
        info!(
            component = "fixture_connector",
            event = "fixture.cancelled",
            dao = %self.dao,
            "Fixture client cancelled"
        );
    }

    fn set_accounts(&self, accounts: Vec<String>) {
        match self.accounts.lock() {
            Ok(mut current) => *current = accounts,
            Err(_) => warn!(
                component = "fixture_connector",
                event = "fixture.accounts.poisoned",
                "Accounts lock poisoned"
            ),
        }
    }

    fn modify_address_identity(
        &self,
        address: &str,
        identity: AddressIdentity,
    ) -> BoxFuture<'static, Result<(), ConnectorError>> {
        let result = self.ensure_live().and_then(|_| {
            self.identities
                .write()
                .map(|mut identities| {
                    identities.insert(address.to_lowercase(), identity.name);
                })
                .map_err(|_| ConnectorError::Identity("identity store poisoned".to_string()))
        });
        Box::pin(async move { result })
    }

    fn resolve_address_identity(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<Option<AddressIdentity>, ConnectorError>> {
        let result = self.ensure_live().and_then(|_| {
            self.identities
                .read()
                .map(|identities| {
                    identities
                        .get(&address.to_lowercase())
                        .map(|name| AddressIdentity { name: name.clone() })
                })
                .map_err(|_| ConnectorError::Identity("identity store poisoned".to_string()))
        });
        Box::pin(async move { result })
    }

    fn request_address_identity_modification(
        &self,
        address: &str,
    ) -> BoxFuture<'static, Result<(), ConnectorError>> {
        let live = self.ensure_live();
        let events = self.events.clone();
        let address = address.to_string();

        Box::pin(async move {
            live?;
            let (responder, rx) = Responder::channel();
            if !events.emit(OrgEvent::IdentityIntent { address, responder }) {
                return Err(ConnectorError::ChannelClosed);
            }
            rx.await.map_err(|_| ConnectorError::ChannelClosed)?
        })
    }
}
