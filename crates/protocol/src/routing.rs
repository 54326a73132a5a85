//! Location parsing and formatting
//!
//! `parse_path` turns a `(pathname, search)` pair into a [`Locator`];
//! `app_path` and `preferences_search` go the other way.

use crate::types::{AppMode, Locator, PreferencesLocation};

/// Instance shown when the path names only the organization
pub const HOME_INSTANCE: &str = "home";

const PREFERENCES_KEY: &str = "preferences";

/// Parse a location into a locator. Total: unknown shapes fall back to
/// the start screen.
pub fn parse_path(pathname: &str, search: &str) -> Locator {
    let pathname = if pathname.is_empty() { "/" } else { pathname };
    let parts: Vec<&str> = pathname.split('/').filter(|p| !p.is_empty()).collect();

    let mut locator = Locator {
        mode: AppMode::Start,
        pathname: pathname.to_string(),
        search: search.to_string(),
        dao: None,
        instance_id: None,
        instance_path: None,
        action: None,
        preferences: parse_preferences(search),
    };

    match parts.as_slice() {
        [] => {}
        ["open", ..] => {
            locator.action = Some("open".to_string());
        }
        ["create", ..] => {
            locator.mode = AppMode::Setup;
            locator.action = Some("create".to_string());
        }
        [dao, rest @ ..] => {
            locator.mode = AppMode::Org;
            locator.dao = Some((*dao).to_string());
            locator.instance_id = Some(rest.first().copied().unwrap_or(HOME_INSTANCE).to_string());
            let tail = rest.get(1..).unwrap_or_default();
            locator.instance_path = Some(format!("/{}", tail.join("/")));
        }
    }

    locator
}

/// The pieces of an org-mode location
#[derive(Debug, Clone, Copy)]
pub struct AppLocation<'a> {
    pub dao: &'a str,
    pub instance_id: &'a str,
    pub instance_path: &'a str,
    pub search: &'a str,
}

/// Format an org-mode location as a path.
pub fn app_path(location: AppLocation<'_>) -> String {
    let instance_path = location.instance_path.trim_start_matches('/');
    let mut path = format!("/{}", location.dao);
    if location.instance_id != HOME_INSTANCE || !instance_path.is_empty() {
        path.push('/');
        path.push_str(location.instance_id);
    }
    if !instance_path.is_empty() {
        path.push('/');
        path.push_str(instance_path);
    }
    path.push_str(location.search);
    path
}

/// Path of `locator` with its query replaced by `search`.
pub fn path_with_search(locator: &Locator, search: &str) -> String {
    match (&locator.dao, &locator.instance_id) {
        (Some(dao), Some(instance_id)) => app_path(AppLocation {
            dao,
            instance_id,
            instance_path: locator.instance_path.as_deref().unwrap_or("/"),
            search,
        }),
        _ => format!("{}{}", locator.pathname, search),
    }
}

/// Encode a preferences screen (and one optional key/value) as a query.
pub fn preferences_search(screen: &str, data: Option<(&str, &str)>) -> String {
    let mut search = format!(
        "?{}={}",
        PREFERENCES_KEY,
        urlencoding::encode(&format!("/{screen}"))
    );
    if let Some((key, value)) = data {
        search.push('&');
        search.push_str(&urlencoding::encode(key));
        search.push('=');
        search.push_str(&urlencoding::encode(value));
    }
    search
}

fn parse_preferences(search: &str) -> Option<PreferencesLocation> {
    let query = search.strip_prefix('?').unwrap_or(search);
    let mut screen = None;
    let mut data = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key);
        let value = decode(value);
        if key == PREFERENCES_KEY {
            screen = Some(value.trim_start_matches('/').to_string());
        } else if data.is_none() {
            data = Some((key, value));
        }
    }

    screen.map(|screen| PreferencesLocation { screen, data })
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Strip a trailing `.<suffix>` from a name, if present.
pub fn strip_name_suffix<'a>(name: &'a str, suffix: &str) -> &'a str {
    name.strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}
