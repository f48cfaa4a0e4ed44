//! Navigation: the URL as the single shared, mutable source of truth.
//!
//! [`Navigator`] is the seam between the table engine and whatever owns the
//! address bar. [`History`] implements it in memory with the semantics of a
//! browser session history (push truncates forward entries, replace edits
//! in place, back/forward move a cursor).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tablesync_core::QueryParams;
use tokio::sync::watch;
use tracing::debug;

/// A path plus its query parameters. Fragments are not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: QueryParams,
}

impl Location {
    pub fn new(path: impl Into<String>, query: QueryParams) -> Self {
        Self {
            path: path.into(),
            query,
        }
    }

    /// Parse `/path?query#fragment`.
    pub fn parse(href: &str) -> Self {
        let href = href.split_once('#').map_or(href, |(before, _)| before);
        match href.split_once('?') {
            Some((path, query)) => Self::new(path, QueryParams::parse(query)),
            None => Self::new(href, QueryParams::new()),
        }
    }

    /// Render as `path?query`, without the `?` when the query is empty.
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Same path, different query.
    pub fn with_query(&self, query: QueryParams) -> Self {
        Self::new(self.path.clone(), query)
    }
}

/// Read and write access to the current URL.
pub trait Navigator: Send + Sync {
    /// The location being shown right now.
    fn current(&self) -> Location;

    /// Navigate to `location`, adding a history entry.
    fn push(&self, location: Location);

    /// Swap the current entry for `location` without adding one.
    fn replace(&self, location: Location);

    /// Receive every location change, whatever caused it.
    fn subscribe(&self) -> watch::Receiver<Location>;
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn current(&self) -> Location {
        (**self).current()
    }

    fn push(&self, location: Location) {
        (**self).push(location)
    }

    fn replace(&self, location: Location) {
        (**self).replace(location)
    }

    fn subscribe(&self) -> watch::Receiver<Location> {
        (**self).subscribe()
    }
}

struct Entries {
    stack: Vec<Location>,
    cursor: usize,
}

/// In-memory session history.
pub struct History {
    entries: Mutex<Entries>,
    changes: watch::Sender<Location>,
}

impl History {
    pub fn new(initial: Location) -> Self {
        let (changes, _) = watch::channel(initial.clone());
        Self {
            entries: Mutex::new(Entries {
                stack: vec![initial],
                cursor: 0,
            }),
            changes,
        }
    }

    /// Start a history at the given href.
    pub fn at(href: &str) -> Self {
        Self::new(Location::parse(href))
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, location: Location) {
        debug!(href = %location.href(), "location changed");
        self.changes.send_replace(location);
    }

    /// Step back one entry. Returns false at the start of history.
    pub fn back(&self) -> bool {
        let location = {
            let mut entries = self.lock();
            if entries.cursor == 0 {
                return false;
            }
            entries.cursor -= 1;
            entries.stack[entries.cursor].clone()
        };
        self.announce(location);
        true
    }

    /// Step forward one entry. Returns false at the end of history.
    pub fn forward(&self) -> bool {
        let location = {
            let mut entries = self.lock();
            if entries.cursor + 1 >= entries.stack.len() {
                return false;
            }
            entries.cursor += 1;
            entries.stack[entries.cursor].clone()
        };
        self.announce(location);
        true
    }

    /// Number of entries in the session.
    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().stack.is_empty()
    }

    /// Every entry's href, oldest first.
    pub fn hrefs(&self) -> Vec<String> {
        self.lock().stack.iter().map(Location::href).collect()
    }
}

impl Navigator for History {
    fn current(&self) -> Location {
        let entries = self.lock();
        entries.stack[entries.cursor].clone()
    }

    fn push(&self, location: Location) {
        {
            let mut entries = self.lock();
            let keep = entries.cursor + 1;
            entries.stack.truncate(keep);
            entries.stack.push(location.clone());
            entries.cursor = keep;
        }
        self.announce(location);
    }

    fn replace(&self, location: Location) {
        {
            let mut entries = self.lock();
            let cursor = entries.cursor;
            entries.stack[cursor] = location.clone();
        }
        self.announce(location);
    }

    fn subscribe(&self) -> watch::Receiver<Location> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_parse_and_href() {
        let loc = Location::parse("/users?page=2&status=active#top");
        assert_eq!(loc.path, "/users");
        assert_eq!(loc.query.get("page"), Some("2"));
        assert_eq!(loc.href(), "/users?page=2&status=active");

        let bare = Location::parse("/users");
        assert!(bare.query.is_empty());
        assert_eq!(bare.href(), "/users");
    }

    #[test]
    fn push_truncates_forward_entries() {
        let history = History::at("/users");
        history.push(Location::parse("/users?page=2"));
        history.push(Location::parse("/users?page=3"));
        assert!(history.back());
        history.push(Location::parse("/users?page=9"));
        assert_eq!(
            history.hrefs(),
            vec!["/users", "/users?page=2", "/users?page=9"]
        );
        assert!(!history.forward());
    }

    #[test]
    fn replace_keeps_length() {
        let history = History::at("/users");
        history.replace(Location::parse("/users?limit=10"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.current().href(), "/users?limit=10");
    }

    #[test]
    fn back_and_forward_move_cursor() {
        let history = History::at("/a");
        history.push(Location::parse("/b"));
        assert!(history.back());
        assert_eq!(history.current().path, "/a");
        assert!(!history.back());
        assert!(history.forward());
        assert_eq!(history.current().path, "/b");
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let history = History::at("/users");
        let mut rx = history.subscribe();

        history.push(Location::parse("/users?page=2"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().href(), "/users?page=2");

        history.back();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().href(), "/users");
    }
}
