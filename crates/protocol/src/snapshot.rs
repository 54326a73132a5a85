//! Immutable view of the orchestrator state handed to renderers

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Pending request to edit the label of an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityIntentView {
    pub address: String,
    pub label: Option<String>,
}

/// Full session state as published after every update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub revision: u64,
    pub locator: Option<Locator>,
    pub has_prev_locator: bool,
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
    pub connected: bool,
    pub wallet_account: Option<String>,
    pub client_loaded: bool,
    pub system_apps_opened: bool,
    pub fatal_error: Option<String>,
}

impl SessionSnapshot {
    /// Apps with their identifier label attached, when one is known.
    pub fn apps_with_identifiers(&self) -> Vec<AppInstance> {
        self.apps
            .iter()
            .map(|app| match self.app_identifiers.get(&app.proxy_address) {
                Some(identifier) => AppInstance {
                    identifier: Some(identifier.clone()),
                    ..app.clone()
                },
                None => app.clone(),
            })
            .collect()
    }

    /// Mode to render, if any location has been seen yet.
    pub fn mode(&self) -> Option<AppMode> {
        self.locator.as_ref().map(|l| l.mode)
    }
}
