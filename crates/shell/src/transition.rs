//! Pure state transition function
//!
//! All orchestrator business logic lives here as a pure, synchronous
//! function: `transition(state, input, settings) -> (state, effects)`.
//! No IO, no async, no channels. The actor executes the returned effects.

use std::collections::HashSet;

use daoshell_connector_core::OrgEvent;
use daoshell_protocol::routing::{app_path, path_with_search, preferences_search, AppLocation};
use daoshell_protocol::{
    can_upgrade_org, parse_path, AppIdentifiers, AppInstance, DaoAddress, IdentityIntentView,
    LoadStatus, Locator, Permissions, RepoInfo, SignatureBag, TransactionBag,
};

use crate::history::Location;
use crate::state::{DaoState, SessionState};

// ---------------------------------------------------------------------------
// Settings — static knobs the reducer reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    /// Name-service suffix stripped from canonical paths (`aragonid.eth`)
    pub name_suffix: String,
    /// App ids whose repos count towards `can_upgrade_org`
    pub known_app_ids: HashSet<String>,
}

impl Settings {
    pub fn is_known_repo(&self, app_id: &str) -> bool {
        self.known_app_ids.contains(&app_id.to_lowercase())
    }

    /// `acme` and `acme.aragonid.eth` name the same organization. Names
    /// are otherwise compared exactly.
    pub fn same_dao(&self, a: &str, b: &str) -> bool {
        self.canonical_dao(a) == self.canonical_dao(b)
    }

    fn canonical_dao<'a>(&self, dao: &'a str) -> &'a str {
        daoshell_protocol::routing::strip_name_suffix(dao, &self.name_suffix)
    }

    fn has_name_suffix(&self, dao: &str) -> bool {
        self.canonical_dao(dao) != dao
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Data-only organization callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum OrgUpdate {
    DaoAddress(DaoAddress),
    Web3 { endpoint: String },
    Apps(Vec<AppInstance>),
    Permissions(Permissions),
    Forwarders(Vec<String>),
    AppIdentifiers(AppIdentifiers),
    InstalledRepos(Vec<RepoInfo>),
    Transaction(TransactionBag),
    Signatures(SignatureBag),
}

impl TryFrom<OrgEvent> for OrgUpdate {
    /// Events that carry a responder are handed back untouched.
    type Error = OrgEvent;

    fn try_from(event: OrgEvent) -> Result<Self, Self::Error> {
        match event {
            OrgEvent::DaoAddress(address) => Ok(OrgUpdate::DaoAddress(address)),
            OrgEvent::Web3 { endpoint } => Ok(OrgUpdate::Web3 { endpoint }),
            OrgEvent::Apps(apps) => Ok(OrgUpdate::Apps(apps)),
            OrgEvent::Permissions(permissions) => Ok(OrgUpdate::Permissions(permissions)),
            OrgEvent::Forwarders(forwarders) => Ok(OrgUpdate::Forwarders(forwarders)),
            OrgEvent::AppIdentifiers(ids) => Ok(OrgUpdate::AppIdentifiers(ids)),
            OrgEvent::InstalledRepos(repos) => Ok(OrgUpdate::InstalledRepos(repos)),
            OrgEvent::Transaction(bag) => Ok(OrgUpdate::Transaction(bag)),
            OrgEvent::Signatures(bag) => Ok(OrgUpdate::Signatures(bag)),
            other @ (OrgEvent::IdentityIntent { .. } | OrgEvent::RequestPath { .. }) => {
                Err(other)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// The history reported a location change
    Navigated(Location),

    // -- Client lifecycle -----------------------------------------------------
    ClientConnected {
        generation: u64,
    },
    ClientFailed {
        generation: u64,
        error: String,
    },
    Org {
        generation: u64,
        update: OrgUpdate,
    },
    /// Identity intent with its pre-filled label, ready to show
    IdentityIntentOpened {
        generation: u64,
        address: String,
        label: Option<String>,
    },
    IdentityWriteFinished {
        generation: u64,
        error: Option<String>,
    },
    PathRequested {
        generation: u64,
        app_address: String,
        path: String,
    },

    // -- External sources -----------------------------------------------------
    WalletAccountChanged(Option<String>),
    ConnectivityChanged(bool),

    // -- Intents from the presentation layer ----------------------------------
    Navigate(String),
    NavigateBack,
    OpenPreferences {
        screen: String,
        data: Option<(String, String)>,
    },
    ClosePreferences,
    CancelIdentity,
    ToggleSystemApps,
}

// ---------------------------------------------------------------------------
// Effects — describe IO to be executed by the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOp {
    Push(String),
    Replace(Location),
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentRejection {
    Cancelled,
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the current client and stop delivery of its events
    TeardownClient,
    /// Start building a client for `dao`
    Connect { generation: u64, dao: String },
    /// Keep the client that just finished connecting
    AdoptClient,
    /// Cancel the client that just finished connecting
    DiscardClient,
    SetAccounts(Vec<String>),
    History(HistoryOp),
    ResolvePathRequest,
    RejectPathRequest { app_address: String },
    /// Keep the incoming identity intent responder as the pending one
    HoldIdentityIntent,
    /// Reject the incoming identity intent responder
    DropIdentityIntent,
    ResolveIdentityIntent,
    RejectIdentityIntent(IntentRejection),
    PersistSystemAppsOpened(bool),
}

// ---------------------------------------------------------------------------
// transition() — the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition.
///
/// Given the current state and an input, returns the new state and the
/// effects (client calls, history changes, responder answers) to execute.
pub fn transition(
    mut state: SessionState,
    input: Input,
    settings: &Settings,
) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();

    // A fatal error freezes the session.
    if state.fatal_error.is_some() {
        match input {
            Input::ClientConnected { .. } => effects.push(Effect::DiscardClient),
            Input::IdentityIntentOpened { .. } => effects.push(Effect::DropIdentityIntent),
            Input::PathRequested { app_address, .. } => {
                effects.push(Effect::RejectPathRequest { app_address })
            }
            _ => {}
        }
        return (state, effects);
    }

    match input {
        // -- Location -----------------------------------------------------------
        Input::Navigated(location) => {
            if !location.already_parsed {
                let locator = parse_path(&location.pathname, &location.search);
                update_locator(&mut state, locator, settings, &mut effects);
            }
        }

        Input::Navigate(path) => push_path(&state, path, &mut effects),

        Input::NavigateBack => {
            if state.prev_locator.is_some() {
                effects.push(Effect::History(HistoryOp::Back));
            } else {
                effects.push(Effect::History(HistoryOp::Replace(Location::from_path(
                    "/",
                ))));
            }
        }

        Input::OpenPreferences { screen, data } => {
            if let Some(locator) = &state.locator {
                let data = data.as_ref().map(|(k, v)| (k.as_str(), v.as_str()));
                let path = path_with_search(locator, &preferences_search(&screen, data));
                push_path(&state, path, &mut effects);
            }
        }

        Input::ClosePreferences => {
            if let Some(locator) = &state.locator {
                let path = path_with_search(locator, "");
                push_path(&state, path, &mut effects);
            }
        }

        // -- Client lifecycle ---------------------------------------------------
        Input::ClientConnected { generation } => {
            if generation != state.generation || !state.connecting {
                effects.push(Effect::DiscardClient);
            } else {
                state.connecting = false;
                state.client_loaded = true;
                effects.push(Effect::AdoptClient);
                if let Some(account) = &state.wallet_account {
                    effects.push(Effect::SetAccounts(vec![account.clone()]));
                }
            }
        }

        Input::ClientFailed { generation, error } => {
            if generation == state.generation && state.connecting {
                state.connecting = false;
                state.dao.dao_status = LoadStatus::Error;
                state.dao.apps_status = LoadStatus::Error;
                state.fatal_error = Some(error);
            }
        }

        Input::Org { generation, update } => {
            if generation == state.generation {
                apply_org_update(&mut state.dao, update, settings);
            }
        }

        Input::IdentityIntentOpened {
            generation,
            address,
            label,
        } => {
            if generation == state.generation {
                state.dao.identity_intent = Some(IdentityIntentView { address, label });
                effects.push(Effect::HoldIdentityIntent);
            } else {
                effects.push(Effect::DropIdentityIntent);
            }
        }

        Input::IdentityWriteFinished { generation, error } => {
            if generation == state.generation {
                match error {
                    None => {
                        state.dao.identity_intent = None;
                        effects.push(Effect::ResolveIdentityIntent);
                    }
                    Some(error) => {
                        effects.push(Effect::RejectIdentityIntent(IntentRejection::WriteFailed(
                            error,
                        )));
                    }
                }
            }
        }

        Input::CancelIdentity => {
            if state.dao.identity_intent.take().is_some() {
                effects.push(Effect::RejectIdentityIntent(IntentRejection::Cancelled));
            }
        }

        Input::PathRequested {
            generation,
            app_address,
            path,
        } => {
            let target = match (state.active_dao(), state.active_instance()) {
                (Some(dao), Some(instance_id))
                    if generation == state.generation && instance_id == app_address =>
                {
                    Some(app_path(AppLocation {
                        dao: settings.canonical_dao(dao),
                        instance_id,
                        instance_path: &path,
                        search: "",
                    }))
                }
                _ => None,
            };
            match target {
                Some(target) => {
                    effects.push(Effect::ResolvePathRequest);
                    effects.push(Effect::History(HistoryOp::Replace(Location::from_path(
                        &target,
                    ))));
                }
                None => effects.push(Effect::RejectPathRequest { app_address }),
            }
        }

        // -- External sources ---------------------------------------------------
        Input::WalletAccountChanged(account) => {
            if account != state.wallet_account {
                state.wallet_account = account;
                if state.client_loaded {
                    effects.push(Effect::SetAccounts(
                        state.wallet_account.iter().cloned().collect(),
                    ));
                }
            }
        }

        Input::ConnectivityChanged(connected) => {
            state.connected = connected;
        }

        Input::ToggleSystemApps => {
            state.system_apps_opened = !state.system_apps_opened;
            effects.push(Effect::PersistSystemAppsOpened(state.system_apps_opened));
        }
    }

    (state, effects)
}

fn push_path(state: &SessionState, path: String, effects: &mut Vec<Effect>) {
    let current = state.locator.as_ref().map(Locator::path);
    if current.as_deref() != Some(path.as_str()) {
        effects.push(Effect::History(HistoryOp::Push(path)));
    }
}

fn update_locator(
    state: &mut SessionState,
    locator: Locator,
    settings: &Settings,
    effects: &mut Vec<Effect>,
) {
    let prev = state.locator.take();
    let prev_dao = prev.as_ref().and_then(|l| l.dao.as_deref());

    match (locator.dao.as_deref(), prev_dao) {
        (Some(dao), prev_dao) if !prev_dao.is_some_and(|p| settings.same_dao(dao, p)) => {
            if prev_dao.is_some() {
                effects.push(Effect::TeardownClient);
            }
            state.generation += 1;
            state.dao = DaoState::loading();
            state.client_loaded = false;
            state.connecting = true;
            effects.push(Effect::Connect {
                generation: state.generation,
                dao: dao.to_string(),
            });
        }
        (None, Some(_)) => {
            effects.push(Effect::TeardownClient);
            state.generation += 1;
            state.dao = DaoState::default();
            state.client_loaded = false;
            state.connecting = false;
        }
        _ => {}
    }

    // Canonical address bar: drop the name-service suffix without re-parsing.
    if let Some(dao) = locator.dao.as_deref() {
        if settings.has_name_suffix(dao) {
            let suffix = format!(".{}", settings.name_suffix);
            effects.push(Effect::History(HistoryOp::Replace(Location {
                pathname: locator.pathname.replacen(&suffix, "", 1),
                search: locator.search.clone(),
                already_parsed: true,
            })));
        }
    }

    state.prev_locator = prev;
    state.locator = Some(locator);
}

fn apply_org_update(dao: &mut DaoState, update: OrgUpdate, settings: &Settings) {
    match update {
        OrgUpdate::DaoAddress(address) => {
            dao.dao_status = LoadStatus::Ready;
            dao.dao_address = address;
        }
        OrgUpdate::Apps(apps) => {
            dao.apps = apps;
            dao.apps_status = LoadStatus::Ready;
        }
        OrgUpdate::Permissions(permissions) => {
            dao.permissions = permissions;
            dao.permissions_loading = false;
        }
        OrgUpdate::AppIdentifiers(ids) => {
            dao.app_identifiers = ids;
        }
        OrgUpdate::InstalledRepos(repos) => {
            dao.can_upgrade_org = can_upgrade_org(&repos, |id| settings.is_known_repo(id));
            dao.repos = repos;
        }
        OrgUpdate::Transaction(bag) => {
            dao.transaction_bag = Some(bag);
        }
        OrgUpdate::Signatures(bag) => {
            dao.signature_bag = Some(bag);
        }
        // Informational only
        OrgUpdate::Web3 { .. } | OrgUpdate::Forwarders(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daoshell_protocol::{AppMode, RepoVersion};

    fn settings() -> Settings {
        Settings {
            name_suffix: "aragonid.eth".to_string(),
            known_app_ids: ["0xvoting".to_string()].into_iter().collect(),
        }
    }

    fn nav(path: &str) -> Input {
        Input::Navigated(Location::from_path(path))
    }

    fn run(state: SessionState, inputs: Vec<Input>) -> (SessionState, Vec<Effect>) {
        let settings = settings();
        let mut all = Vec::new();
        let mut state = state;
        for input in inputs {
            let (next, effects) = transition(state, input, &settings);
            state = next;
            all.extend(effects);
        }
        (state, all)
    }

    fn app(proxy: &str) -> AppInstance {
        AppInstance {
            app_id: "0xvoting".to_string(),
            proxy_address: proxy.to_string(),
            name: None,
            code_address: None,
            content_uri: None,
            has_web_app: true,
            is_forwarder: false,
            identifier: None,
        }
    }

    fn repo(app_id: &str, current: &str, latest: &str) -> RepoInfo {
        RepoInfo {
            app_id: app_id.to_string(),
            name: None,
            current_version: RepoVersion {
                version: current.to_string(),
                content_uri: None,
            },
            latest_version: RepoVersion {
                version: latest.to_string(),
                content_uri: None,
            },
        }
    }

    /// State with `acme` loaded and its client adopted
    fn loaded_acme() -> SessionState {
        let (state, _) = run(
            SessionState::new(false),
            vec![nav("/acme/0xbbb"), Input::ClientConnected { generation: 1 }],
        );
        state
    }

    #[test]
    fn entering_a_dao_starts_loading() {
        let (state, effects) = run(SessionState::new(false), vec![nav("/acme")]);

        assert_eq!(state.dao.dao_status, LoadStatus::Loading);
        assert_eq!(state.dao.apps_status, LoadStatus::Loading);
        assert_eq!(state.generation, 1);
        assert!(state.connecting);
        assert_eq!(
            effects,
            vec![Effect::Connect {
                generation: 1,
                dao: "acme".to_string()
            }]
        );
    }

    #[test]
    fn switching_daos_tears_down_before_connecting() {
        let (state, effects) = run(loaded_acme(), vec![nav("/beta")]);

        assert_eq!(
            effects,
            vec![
                Effect::TeardownClient,
                Effect::Connect {
                    generation: 2,
                    dao: "beta".to_string()
                }
            ]
        );
        assert!(!state.client_loaded);
        assert_eq!(state.dao, DaoState::loading());
    }

    #[test]
    fn same_dao_navigation_keeps_the_session() {
        let (state, effects) = run(loaded_acme(), vec![nav("/acme/0xccc/votes")]);
        assert!(effects.is_empty());
        assert!(state.client_loaded);
        assert_eq!(state.generation, 1);
    }

    #[test]
    fn leaving_a_dao_unloads_everything() {
        let (mut state, _) = run(
            loaded_acme(),
            vec![Input::Org {
                generation: 1,
                update: OrgUpdate::Apps(vec![app("0x1")]),
            }],
        );
        state.connected = true;

        let (state, effects) = run(state, vec![nav("/")]);

        assert_eq!(effects, vec![Effect::TeardownClient]);
        assert_eq!(state.dao, DaoState::default());
        assert_eq!(state.dao.dao_status, LoadStatus::Unloaded);
        assert!(!state.client_loaded);
        assert!(state.connected);
        assert_eq!(state.locator.as_ref().map(|l| l.mode), Some(AppMode::Start));
    }

    #[test]
    fn suffixed_dao_is_normalized_with_a_replace() {
        let (state, effects) = run(SessionState::new(false), vec![nav("/acme.aragonid.eth")]);

        assert_eq!(
            effects,
            vec![
                Effect::Connect {
                    generation: 1,
                    dao: "acme.aragonid.eth".to_string()
                },
                Effect::History(HistoryOp::Replace(Location {
                    pathname: "/acme".to_string(),
                    search: String::new(),
                    already_parsed: true,
                }))
            ]
        );

        // The replace comes back marked and is not parsed again.
        let marked = Input::Navigated(Location {
            pathname: "/acme".to_string(),
            search: String::new(),
            already_parsed: true,
        });
        let (after, effects) = run(state.clone(), vec![marked]);
        assert!(effects.is_empty());
        assert_eq!(after, state);
    }

    #[test]
    fn canonical_and_suffixed_names_are_the_same_dao() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme.aragonid.eth")]);
        let (_, effects) = run(state, vec![nav("/acme/0xbbb")]);
        assert!(effects.is_empty());
    }

    #[test]
    fn dao_names_differing_in_case_are_different_daos() {
        let (state, _) = run(SessionState::new(false), vec![nav("/Acme")]);
        let (state, effects) = run(state, vec![nav("/acme")]);

        assert!(effects.contains(&Effect::TeardownClient));
        assert!(effects.contains(&Effect::Connect {
            generation: 2,
            dao: "acme".to_string()
        }));
        assert_eq!(state.generation, 2);
    }

    #[test]
    fn stale_client_is_discarded() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme"), nav("/beta")]);

        let (state, effects) = run(state, vec![Input::ClientConnected { generation: 1 }]);
        assert_eq!(effects, vec![Effect::DiscardClient]);
        assert!(!state.client_loaded);
        assert!(state.connecting);

        let (state, effects) = run(state, vec![Input::ClientConnected { generation: 2 }]);
        assert_eq!(effects, vec![Effect::AdoptClient]);
        assert!(state.client_loaded);
    }

    #[test]
    fn stale_failure_is_ignored() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme"), nav("/beta")]);
        let (state, _) = run(
            state,
            vec![Input::ClientFailed {
                generation: 1,
                error: "boom".to_string(),
            }],
        );
        assert!(state.fatal_error.is_none());
        assert_eq!(state.dao.dao_status, LoadStatus::Loading);
    }

    #[test]
    fn connection_failure_is_fatal_and_terminal() {
        let (state, _) = run(
            SessionState::new(false),
            vec![
                nav("/acme"),
                Input::ClientFailed {
                    generation: 1,
                    error: "Organization not found: acme".to_string(),
                },
            ],
        );
        assert_eq!(state.dao.dao_status, LoadStatus::Error);
        assert_eq!(state.dao.apps_status, LoadStatus::Error);
        assert!(state.fatal_error.is_some());

        let (after, effects) = run(state.clone(), vec![nav("/beta"), Input::NavigateBack]);
        assert!(effects.is_empty());
        assert_eq!(after, state);
    }

    #[test]
    fn adopting_pushes_known_wallet_account() {
        let (state, effects) = run(
            SessionState::new(false),
            vec![
                Input::WalletAccountChanged(Some("0xwallet".to_string())),
                nav("/acme"),
                Input::ClientConnected { generation: 1 },
            ],
        );
        assert!(state.client_loaded);
        assert_eq!(
            &effects[1..],
            &[
                Effect::AdoptClient,
                Effect::SetAccounts(vec!["0xwallet".to_string()])
            ]
        );
    }

    #[test]
    fn wallet_changes_reach_loaded_client_only() {
        let (_, effects) = run(
            SessionState::new(false),
            vec![Input::WalletAccountChanged(Some("0x1".to_string()))],
        );
        assert!(effects.is_empty());

        let (state, effects) = run(loaded_acme(), vec![Input::WalletAccountChanged(None)]);
        assert!(effects.is_empty(), "unchanged account is not pushed");

        let (state, effects) = run(
            state,
            vec![Input::WalletAccountChanged(Some("0x1".to_string()))],
        );
        assert_eq!(effects, vec![Effect::SetAccounts(vec!["0x1".to_string()])]);

        let (_, effects) = run(state, vec![Input::WalletAccountChanged(None)]);
        assert_eq!(effects, vec![Effect::SetAccounts(vec![])]);
    }

    #[test]
    fn apps_are_replaced_wholesale() {
        let (state, _) = run(
            loaded_acme(),
            vec![
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::Apps(vec![app("0x1"), app("0x2")]),
                },
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::Apps(vec![app("0x3")]),
                },
            ],
        );
        assert_eq!(state.dao.apps, vec![app("0x3")]);
        assert_eq!(state.dao.apps_status, LoadStatus::Ready);
    }

    #[test]
    fn callbacks_update_their_own_slices() {
        let mut permissions = Permissions::new();
        permissions.insert("CREATE_VOTES_ROLE".to_string(), vec!["0xany".to_string()]);
        let mut ids = AppIdentifiers::new();
        ids.insert("0x1".to_string(), "Council".to_string());
        let address = DaoAddress {
            address: "0xdao".to_string(),
            domain: "acme.aragonid.eth".to_string(),
        };

        let (state, _) = run(
            loaded_acme(),
            vec![
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::DaoAddress(address.clone()),
                },
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::Permissions(permissions.clone()),
                },
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::AppIdentifiers(ids.clone()),
                },
                Input::Org {
                    generation: 1,
                    update: OrgUpdate::Forwarders(vec!["0x1".to_string()]),
                },
            ],
        );

        assert_eq!(state.dao.dao_status, LoadStatus::Ready);
        assert_eq!(state.dao.apps_status, LoadStatus::Loading);
        assert_eq!(state.dao.dao_address, address);
        assert_eq!(state.dao.permissions, permissions);
        assert!(!state.dao.permissions_loading);
        assert_eq!(state.dao.app_identifiers, ids);
    }

    #[test]
    fn repos_recompute_upgrade_flag() {
        let (state, _) = run(
            loaded_acme(),
            vec![Input::Org {
                generation: 1,
                update: OrgUpdate::InstalledRepos(vec![repo("0xvoting", "1.2.0", "2.0.0")]),
            }],
        );
        assert!(state.dao.can_upgrade_org);

        let (state, _) = run(
            state,
            vec![Input::Org {
                generation: 1,
                update: OrgUpdate::InstalledRepos(vec![repo("0xother", "1.0.0", "5.0.0")]),
            }],
        );
        assert!(!state.dao.can_upgrade_org);
        assert_eq!(state.dao.repos.len(), 1);
    }

    #[test]
    fn events_from_old_generation_are_ignored() {
        let (state, _) = run(loaded_acme(), vec![nav("/beta")]);
        let (state, _) = run(
            state,
            vec![Input::Org {
                generation: 1,
                update: OrgUpdate::Apps(vec![app("0x1")]),
            }],
        );
        assert!(state.dao.apps.is_empty());
        assert_eq!(state.dao.apps_status, LoadStatus::Loading);
    }

    #[test]
    fn navigate_is_idempotent() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme")]);
        let (_, effects) = run(state.clone(), vec![Input::Navigate("/acme".to_string())]);
        assert!(effects.is_empty());

        let (_, effects) = run(state, vec![Input::Navigate("/acme/0xbbb".to_string())]);
        assert_eq!(
            effects,
            vec![Effect::History(HistoryOp::Push("/acme/0xbbb".to_string()))]
        );
    }

    #[test]
    fn navigate_back_without_history_replaces_root() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme")]);
        let (_, effects) = run(state, vec![Input::NavigateBack]);
        assert_eq!(
            effects,
            vec![Effect::History(HistoryOp::Replace(Location::from_path("/")))]
        );
    }

    #[test]
    fn navigate_back_with_history_pops() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme"), nav("/acme/0xbbb")]);
        let (_, effects) = run(state, vec![Input::NavigateBack]);
        assert_eq!(effects, vec![Effect::History(HistoryOp::Back)]);
    }

    #[test]
    fn preferences_open_and_close_through_push() {
        let (state, _) = run(SessionState::new(false), vec![nav("/acme/0xbbb")]);
        let (_, effects) = run(
            state,
            vec![Input::OpenPreferences {
                screen: "network".to_string(),
                data: None,
            }],
        );
        assert_eq!(
            effects,
            vec![Effect::History(HistoryOp::Push(
                "/acme/0xbbb?preferences=%2Fnetwork".to_string()
            ))]
        );

        let (state, _) = run(
            SessionState::new(false),
            vec![nav("/acme/0xbbb?preferences=%2Fnetwork")],
        );
        let (_, effects) = run(state, vec![Input::ClosePreferences]);
        assert_eq!(
            effects,
            vec![Effect::History(HistoryOp::Push("/acme/0xbbb".to_string()))]
        );
    }

    #[test]
    fn inactive_app_cannot_change_path() {
        let state = loaded_acme();
        let (after, effects) = run(
            state.clone(),
            vec![Input::PathRequested {
                generation: 1,
                app_address: "0xAAA".to_string(),
                path: "/settings".to_string(),
            }],
        );
        assert_eq!(
            effects,
            vec![Effect::RejectPathRequest {
                app_address: "0xAAA".to_string()
            }]
        );
        assert_eq!(after, state);
    }

    #[test]
    fn active_app_path_change_replaces_location() {
        let (_, effects) = run(
            loaded_acme(),
            vec![Input::PathRequested {
                generation: 1,
                app_address: "0xbbb".to_string(),
                path: "/settings".to_string(),
            }],
        );
        assert_eq!(
            effects,
            vec![
                Effect::ResolvePathRequest,
                Effect::History(HistoryOp::Replace(Location::from_path(
                    "/acme/0xbbb/settings"
                )))
            ]
        );
    }

    #[test]
    fn identity_intent_lifecycle() {
        let (state, effects) = run(
            loaded_acme(),
            vec![Input::IdentityIntentOpened {
                generation: 1,
                address: "0xabc".to_string(),
                label: Some("Alice".to_string()),
            }],
        );
        assert_eq!(effects, vec![Effect::HoldIdentityIntent]);
        assert_eq!(
            state.dao.identity_intent,
            Some(IdentityIntentView {
                address: "0xabc".to_string(),
                label: Some("Alice".to_string())
            })
        );

        let (failed, effects) = run(
            state.clone(),
            vec![Input::IdentityWriteFinished {
                generation: 1,
                error: Some("denied".to_string()),
            }],
        );
        assert_eq!(
            effects,
            vec![Effect::RejectIdentityIntent(IntentRejection::WriteFailed(
                "denied".to_string()
            ))]
        );
        assert!(failed.dao.identity_intent.is_some(), "slot stays after a failed write");

        let (saved, effects) = run(
            state.clone(),
            vec![Input::IdentityWriteFinished {
                generation: 1,
                error: None,
            }],
        );
        assert_eq!(effects, vec![Effect::ResolveIdentityIntent]);
        assert!(saved.dao.identity_intent.is_none());

        let (cancelled, effects) = run(state, vec![Input::CancelIdentity]);
        assert_eq!(
            effects,
            vec![Effect::RejectIdentityIntent(IntentRejection::Cancelled)]
        );
        assert!(cancelled.dao.identity_intent.is_none());
    }

    #[test]
    fn stale_identity_intent_is_dropped() {
        let (state, _) = run(loaded_acme(), vec![nav("/beta")]);
        let (state, effects) = run(
            state,
            vec![Input::IdentityIntentOpened {
                generation: 1,
                address: "0xabc".to_string(),
                label: None,
            }],
        );
        assert_eq!(effects, vec![Effect::DropIdentityIntent]);
        assert!(state.dao.identity_intent.is_none());
    }

    #[test]
    fn toggling_system_apps_persists() {
        let (state, effects) = run(SessionState::new(false), vec![Input::ToggleSystemApps]);
        assert!(state.system_apps_opened);
        assert_eq!(effects, vec![Effect::PersistSystemAppsOpened(true)]);
    }
}
