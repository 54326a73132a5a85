//! Session state owned by the orchestrator

use daoshell_protocol::{
    AppIdentifiers, AppInstance, DaoAddress, IdentityIntentView, LoadStatus, Locator,
    Permissions, RepoInfo, SessionSnapshot, SignatureBag, TransactionBag,
};

/// Everything tied to the currently loaded organization.
///
/// Replaced wholesale whenever the active DAO changes.
#[derive(Debug, Clone, PartialEq)]
pub struct DaoState {
    pub dao_address: DaoAddress,
    pub dao_status: LoadStatus,
    pub apps_status: LoadStatus,
    pub apps: Vec<AppInstance>,
    pub app_identifiers: AppIdentifiers,
    pub permissions: Permissions,
    pub permissions_loading: bool,
    pub repos: Vec<RepoInfo>,
    pub can_upgrade_org: bool,
    pub identity_intent: Option<IdentityIntentView>,
    pub transaction_bag: Option<TransactionBag>,
    pub signature_bag: Option<SignatureBag>,
}

impl Default for DaoState {
    fn default() -> Self {
        Self {
            dao_address: DaoAddress::default(),
            dao_status: LoadStatus::Unloaded,
            apps_status: LoadStatus::Unloaded,
            apps: Vec::new(),
            app_identifiers: AppIdentifiers::new(),
            permissions: Permissions::new(),
            permissions_loading: true,
            repos: Vec::new(),
            can_upgrade_org: false,
            identity_intent: None,
            transaction_bag: None,
            signature_bag: None,
        }
    }
}

impl DaoState {
    /// Empty state with both lifecycles marked as loading
    pub fn loading() -> Self {
        Self {
            dao_status: LoadStatus::Loading,
            apps_status: LoadStatus::Loading,
            ..Self::default()
        }
    }
}

/// Canonical application state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub revision: u64,
    /// Bumped on every DAO transition; client results and events carry the
    /// generation they were started under.
    pub generation: u64,
    pub locator: Option<Locator>,
    pub prev_locator: Option<Locator>,
    pub dao: DaoState,
    pub client_loaded: bool,
    pub connecting: bool,
    pub connected: bool,
    pub wallet_account: Option<String>,
    pub fatal_error: Option<String>,
    pub system_apps_opened: bool,
}

impl SessionState {
    pub fn new(system_apps_opened: bool) -> Self {
        Self {
            revision: 0,
            generation: 0,
            locator: None,
            prev_locator: None,
            dao: DaoState::default(),
            client_loaded: false,
            connecting: false,
            connected: false,
            wallet_account: None,
            fatal_error: None,
            system_apps_opened,
        }
    }

    /// DAO named by the current locator
    pub fn active_dao(&self) -> Option<&str> {
        self.locator.as_ref().and_then(|l| l.dao.as_deref())
    }

    /// Active app instance named by the current locator
    pub fn active_instance(&self) -> Option<&str> {
        self.locator.as_ref().and_then(|l| l.instance_id.as_deref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let dao = &self.dao;
        SessionSnapshot {
            revision: self.revision,
            locator: self.locator.clone(),
            has_prev_locator: self.prev_locator.is_some(),
            dao_address: dao.dao_address.clone(),
            dao_status: dao.dao_status,
            apps_status: dao.apps_status,
            apps: dao.apps.clone(),
            app_identifiers: dao.app_identifiers.clone(),
            permissions: dao.permissions.clone(),
            permissions_loading: dao.permissions_loading,
            repos: dao.repos.clone(),
            can_upgrade_org: dao.can_upgrade_org,
            identity_intent: dao.identity_intent.clone(),
            transaction_bag: dao.transaction_bag.clone(),
            signature_bag: dao.signature_bag.clone(),
            connected: self.connected,
            wallet_account: self.wallet_account.clone(),
            client_loaded: self.client_loaded,
            system_apps_opened: self.system_apps_opened,
            fatal_error: self.fatal_error.clone(),
        }
    }
}
