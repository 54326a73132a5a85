//! Navigation source
//!
//! The orchestrator listens to a [`History`] for location changes and drives
//! it with push/replace/back. [`MemoryHistory`] keeps the entry stack in
//! process with browser-history semantics.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

/// A visible location plus the navigation state attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    /// Set on locations the orchestrator already parsed before issuing them.
    pub already_parsed: bool,
}

impl Location {
    /// Split a path like `/acme/0xbbb?x=1` into pathname and search.
    pub fn from_path(path: &str) -> Self {
        let (pathname, search) = match path.find('?') {
            Some(idx) => (&path[..idx], &path[idx..]),
            None => (path, ""),
        };
        Self {
            pathname: if pathname.is_empty() { "/" } else { pathname }.to_string(),
            search: search.to_string(),
            already_parsed: false,
        }
    }

    pub fn path(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

/// Receives every location change
pub type HistoryListener = mpsc::UnboundedSender<Location>;

pub trait History: Send + 'static {
    /// Current location
    fn location(&self) -> Location;

    /// Register the listener notified on every change.
    fn listen(&mut self, listener: HistoryListener);

    /// Add a new entry.
    fn push(&mut self, path: &str);

    /// Overwrite the current entry without adding one.
    fn replace(&mut self, location: Location);

    /// Move to the previous entry, if there is one.
    fn go_back(&mut self);
}

struct Inner {
    entries: Vec<Location>,
    index: usize,
    listener: Option<HistoryListener>,
}

/// In-process history. Clones share the same entry stack.
#[derive(Clone)]
pub struct MemoryHistory {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryHistory {
    pub fn new(initial_path: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: vec![Location::from_path(initial_path)],
                index: 0,
                listener: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Paths of every entry, oldest first
    #[allow(dead_code)]
    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.iter().map(Location::path).collect()
    }

    #[allow(dead_code)]
    pub fn index(&self) -> usize {
        self.lock().index
    }
}

impl Inner {
    fn notify(&self, location: Location) {
        debug!(
            component = "history",
            event = "history.changed",
            path = %location.path(),
            already_parsed = location.already_parsed,
        );
        if let Some(listener) = &self.listener {
            let _ = listener.send(location);
        }
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let inner = self.lock();
        inner.entries[inner.index].clone()
    }

    fn listen(&mut self, listener: HistoryListener) {
        self.lock().listener = Some(listener);
    }

    fn push(&mut self, path: &str) {
        let mut inner = self.lock();
        let location = Location::from_path(path);
        let next = inner.index + 1;
        inner.entries.truncate(next);
        inner.entries.push(location.clone());
        inner.index = next;
        inner.notify(location);
    }

    fn replace(&mut self, location: Location) {
        let mut inner = self.lock();
        let index = inner.index;
        inner.entries[index] = location.clone();
        inner.notify(location);
    }

    fn go_back(&mut self) {
        let mut inner = self.lock();
        if inner.index == 0 {
            return;
        }
        inner.index -= 1;
        // Popped entries are always parsed again.
        let location = Location {
            already_parsed: false,
            ..inner.entries[inner.index].clone()
        };
        inner.notify(location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_splits_search() {
        let location = Location::from_path("/acme/0xbbb?preferences=%2Fnetwork");
        assert_eq!(location.pathname, "/acme/0xbbb");
        assert_eq!(location.search, "?preferences=%2Fnetwork");
        assert_eq!(Location::from_path("").pathname, "/");
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut history = MemoryHistory::new("/");
        history.push("/a");
        history.push("/b");
        history.go_back();
        history.push("/c");
        assert_eq!(history.entries(), vec!["/", "/a", "/c"]);
        assert_eq!(history.index(), 2);
    }

    #[test]
    fn replace_keeps_entry_count() {
        let mut history = MemoryHistory::new("/acme.aragonid.eth");
        history.replace(Location {
            pathname: "/acme".to_string(),
            search: String::new(),
            already_parsed: true,
        });
        assert_eq!(history.entries(), vec!["/acme"]);
        assert!(history.location().already_parsed);
    }

    #[test]
    fn listener_sees_every_change() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut history = MemoryHistory::new("/");
        history.listen(tx);

        history.push("/acme");
        history.go_back();
        history.go_back();

        assert_eq!(rx.try_recv().expect("push").pathname, "/acme");
        assert_eq!(rx.try_recv().expect("back").pathname, "/");
        assert!(rx.try_recv().is_err());
    }
}
