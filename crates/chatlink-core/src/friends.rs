//! Friend List Cache
//!
//! Authoritative in-memory cache of the friend list plus in-flight local
//! additions not yet confirmed by the backend. The backend is the source of
//! truth; this store is a derived, invalidatable cache.

use crate::backend::FriendRecord;
use crate::types::{Friend, FriendStatus, Username};
use crate::DomainError;
use std::collections::BTreeMap;
use tracing::debug;

// ----------------------------------------------------------------------------
// Friend Store
// ----------------------------------------------------------------------------

/// Friend list cache with optimistic pending entries.
///
/// All mutation happens on the engine task's serialized apply path, so
/// [`FriendStore::list`] snapshots are always consistent: readers never
/// observe a partially applied reconcile.
#[derive(Debug, Default)]
pub struct FriendStore {
    friends: BTreeMap<Username, FriendStatus>,
}

impl FriendStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered snapshot of the current cache. Never touches the network.
    pub fn list(&self) -> Vec<Friend> {
        self.friends
            .iter()
            .map(|(username, status)| Friend {
                username: username.clone(),
                status: *status,
            })
            .collect()
    }

    /// Whether `username` is present in any state.
    pub fn contains(&self, username: &Username) -> bool {
        self.friends.contains_key(username)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.friends.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    /// Insert an optimistic `Pending` entry.
    ///
    /// Rejected with [`DomainError::DuplicateFriend`] if the username is
    /// already present, regardless of state.
    pub fn add_pending(&mut self, username: Username) -> Result<(), DomainError> {
        if self.friends.contains_key(&username) {
            return Err(DomainError::DuplicateFriend { username });
        }
        self.friends.insert(username, FriendStatus::Pending);
        Ok(())
    }

    /// Promote an entry to `Confirmed` after the backend echoed it back.
    /// Returns false if the entry is unknown.
    pub fn confirm(&mut self, username: &Username) -> bool {
        match self.friends.get_mut(username) {
            Some(status) => {
                *status = FriendStatus::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Drop an entry, used when an optimistic add fails terminally.
    /// Returns false if the entry is unknown.
    pub fn remove(&mut self, username: &Username) -> bool {
        self.friends.remove(username).is_some()
    }

    /// Replace the cache with server truth.
    ///
    /// Every server-reported username becomes `Confirmed` (promoting matching
    /// pending entries); pending entries the server has not echoed yet are
    /// preserved so a just-submitted add does not flicker away; confirmed
    /// entries the server no longer reports are dropped. Returns whether the
    /// cache changed.
    pub fn reconcile(&mut self, server_friends: &[FriendRecord]) -> bool {
        let mut next: BTreeMap<Username, FriendStatus> = BTreeMap::new();

        for record in server_friends {
            match Username::new(&record.username) {
                Ok(username) => {
                    next.insert(username, FriendStatus::Confirmed);
                }
                Err(err) => {
                    debug!(username = %record.username, %err, "skipping malformed friend record");
                }
            }
        }

        for (username, status) in &self.friends {
            if *status == FriendStatus::Pending && !next.contains_key(username) {
                next.insert(username.clone(), FriendStatus::Pending);
            }
        }

        let changed = next != self.friends;
        self.friends = next;
        changed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
