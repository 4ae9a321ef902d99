use std::time::{Duration, Instant};

use alloy::primitives::Address;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::core::storage::{BulkMutations, Mutation};
use crate::storage::schema::{DATA_COLUMN, keys};

pub const DEFAULT_BALANCE_CACHE_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Suppresses repeated balance-update markers for the same (address, token)
/// inside the TTL window. Shared by every concurrent transform call.
pub struct BalanceUpdateCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl BalanceUpdateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns true when the caller owns the marker for `key`. The check and
    /// the insert happen under the same shard lock.
    pub fn claim(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.ttl {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Appends a `B:<address>:<token>` marker to `out` unless one was emitted
    /// within the TTL. Returns whether a marker was appended.
    pub fn mark(&self, address: &Address, token: &[u8], out: &mut BulkMutations) -> bool {
        let key = keys::balance_update_key(address, token);
        if self.claim(&key) {
            out.push(key, Mutation::set(DATA_COLUMN, ""));
            true
        } else {
            false
        }
    }

    /// Drops claims for markers that never reached storage, so the next
    /// transform emits them again.
    pub fn forget<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for key in keys {
            self.entries.remove(key);
        }
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, marked_at| marked_at.elapsed() < ttl);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "Purged expired balance-update entries");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BalanceUpdateCache {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE_CACHE_TTL)
    }
}
