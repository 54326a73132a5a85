//! Core types shared across the protocol

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Top-level mode of the shell, derived from the location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    Start,
    Setup,
    Org,
}

/// Lifecycle of a remotely loaded slice of organization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Error,
}

/// Decoded `?preferences=` query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesLocation {
    pub screen: String,
    pub data: Option<(String, String)>,
}

/// Parsed representation of the current navigable location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub mode: AppMode,
    pub pathname: String,
    pub search: String,
    pub dao: Option<String>,
    pub instance_id: Option<String>,
    pub instance_path: Option<String>,
    pub action: Option<String>,
    pub preferences: Option<PreferencesLocation>,
}

impl Locator {
    /// Full visible path (pathname plus query)
    pub fn path(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

/// Resolved identity of the loaded organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoAddress {
    pub address: String,
    pub domain: String,
}

/// An installed application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstance {
    pub app_id: String,
    pub proxy_address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code_address: Option<String>,
    #[serde(default)]
    pub content_uri: Option<String>,
    #[serde(default)]
    pub has_web_app: bool,
    #[serde(default)]
    pub is_forwarder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Role → grantee addresses. Forwarded to consumers unchanged.
pub type Permissions = BTreeMap<String, Vec<String>>;

/// Proxy address → human label
pub type AppIdentifiers = HashMap<String, String>;

/// A published version of a repo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoVersion {
    pub version: String,
    #[serde(default)]
    pub content_uri: Option<String>,
}

impl RepoVersion {
    /// Numeric major component, if the version string has one.
    pub fn major(&self) -> Option<u64> {
        self.version.split('.').next()?.trim().parse().ok()
    }
}

/// An installed repo with its current and newest published versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub app_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub current_version: RepoVersion,
    pub latest_version: RepoVersion,
}

impl RepoInfo {
    /// True when the latest major version is ahead of the installed one.
    pub fn has_major_upgrade(&self) -> bool {
        match (self.current_version.major(), self.latest_version.major()) {
            (Some(current), Some(latest)) => current < latest,
            _ => false,
        }
    }
}

/// True iff some recognized repo has a newer major version available.
pub fn can_upgrade_org<F>(repos: &[RepoInfo], is_known: F) -> bool
where
    F: Fn(&str) -> bool,
{
    repos
        .iter()
        .any(|repo| is_known(&repo.app_id) && repo.has_major_upgrade())
}

/// A single on-chain call waiting for the user to sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Most recent batch of pending transactions surfaced by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBag {
    pub id: String,
    pub transactions: Vec<TransactionRequest>,
    #[serde(default)]
    pub external: bool,
}

/// Most recent off-chain signature request surfaced by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBag {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub requesting_app: Option<String>,
}

/// Human metadata attached to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressIdentity {
    pub name: String,
}
