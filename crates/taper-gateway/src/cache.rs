//! Process-local cache of resolved users.
//!
//! Entries are stamped with the instant they were cached and treated as
//! absent once they reach the TTL. Expired entries are evicted on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use taper_core::{Clock, UserId};
use taper_store::User;

/// A user snapshot and the instant it was cached.
#[derive(Debug, Clone)]
pub struct CachedUser {
    /// The snapshot.
    pub user: User,
    /// When it was cached.
    pub cached_at: DateTime<Utc>,
}

/// A TTL cache of users keyed by ID.
///
/// Reads share the lock and writes take it exclusively. Store fetches on a
/// miss happen outside the lock, so two concurrent misses may both fetch and
/// the last insert wins.
pub struct UserCache {
    entries: RwLock<HashMap<UserId, CachedUser>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl UserCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// The configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live snapshot of a user, if cached.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<User> {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            match entries.get(user_id) {
                None => return None,
                Some(entry) if !self.is_expired(entry, now) => return Some(entry.user.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock, a fresh insert may have raced in
        let mut entries = self.entries.write();
        if entries
            .get(user_id)
            .is_some_and(|entry| self.is_expired(entry, now))
        {
            entries.remove(user_id);
            tracing::debug!(user_id = %user_id, "Evicted expired user cache entry");
        }
        None
    }

    /// Insert or replace a user snapshot.
    pub fn insert(&self, user: User) {
        let entry = CachedUser {
            cached_at: self.clock.now(),
            user,
        };
        self.entries.write().insert(entry.user.user_id, entry);
    }

    /// Drop a user from the cache.
    pub fn invalidate(&self, user_id: &UserId) -> bool {
        self.entries.write().remove(user_id).is_some()
    }

    /// Get the number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear all cached users.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn is_expired(&self, entry: &CachedUser, now: DateTime<Utc>) -> bool {
        (now - entry.cached_at)
            .to_std()
            .is_ok_and(|age| age >= self.ttl)
    }
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
