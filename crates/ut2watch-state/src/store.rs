//! StateStore — last-observed status per registered server.
//!
//! Entries are created lazily by the query engine and mutated after every
//! completed query. `HashMap` keeps its capacity after deletions, so under
//! heavy churn of ephemeral servers the store rebuilds its map from the
//! surviving entries once every `max_pending_removals` deletions. That costs
//! O(n) per rebuild, O(n / max_pending_removals) amortized per removal.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::{ServerId, ServerState, StateUpdate};

/// Deletions between two compactions unless configured otherwise.
pub const DEFAULT_MAX_PENDING_REMOVALS: usize = 100;

struct Inner {
    servers: HashMap<ServerId, ServerState>,
    /// Deletions since the last compaction.
    removals: usize,
    compactions: u64,
}

/// Thread-safe status store.
pub struct StateStore {
    inner: RwLock<Inner>,
    max_pending_removals: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store with the default compaction threshold.
    pub fn new() -> Self {
        Self::with_max_pending_removals(DEFAULT_MAX_PENDING_REMOVALS)
    }

    /// Create an empty store that compacts after `threshold` deletions.
    pub fn with_max_pending_removals(threshold: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                servers: HashMap::new(),
                removals: 0,
                compactions: 0,
            }),
            max_pending_removals: threshold.max(1),
        }
    }

    /// Return the state for `id`, creating an offline entry if needed.
    pub async fn get_or_add(&self, id: ServerId) -> ServerState {
        {
            let inner = self.inner.read().await;
            if let Some(state) = inner.servers.get(&id) {
                return state.clone();
            }
        }

        let mut inner = self.inner.write().await;
        inner
            .servers
            .entry(id)
            .or_insert_with(|| ServerState::new(Instant::now()))
            .clone()
    }

    /// Apply a query outcome and return the resulting state.
    ///
    /// Fails with [`StateError::UnknownId`] if `id` has no entry; nothing is
    /// created in that case.
    pub async fn update(&self, id: ServerId, update: StateUpdate) -> StateResult<ServerState> {
        let mut inner = self.inner.write().await;
        let state = inner
            .servers
            .get_mut(&id)
            .ok_or(StateError::UnknownId(id))?;

        state.online = update.online;
        state.details = update.details;
        if update.resolved_address.is_some() {
            state.resolved_address = update.resolved_address;
        }
        state.updated = Some(Instant::now());

        if state.online {
            state.failures = 0;
        } else {
            state.failures = state.failures.saturating_add(1);
        }

        Ok(state.clone())
    }

    /// Delete the entry for `id`, if any.
    pub async fn remove(&self, id: ServerId) -> Option<ServerState> {
        let mut inner = self.inner.write().await;
        self.remove_locked(&mut inner, id)
    }

    /// Remove every entry whose id is not in `live`. Returns the count.
    pub async fn prune(&self, live: &HashSet<ServerId>) -> usize {
        let mut inner = self.inner.write().await;
        let orphans: Vec<ServerId> = inner
            .servers
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();

        for id in &orphans {
            self.remove_locked(&mut inner, *id);
        }
        orphans.len()
    }

    fn remove_locked(&self, inner: &mut Inner, id: ServerId) -> Option<ServerState> {
        let removed = inner.servers.remove(&id)?;
        inner.removals += 1;

        if inner.removals >= self.max_pending_removals {
            compact(inner);
        }
        Some(removed)
    }

    /// Copy of the state for `id`.
    pub async fn get(&self, id: ServerId) -> Option<ServerState> {
        self.inner.read().await.servers.get(&id).cloned()
    }

    /// Copy of every entry, ordered by id.
    pub async fn servers(&self) -> Vec<(ServerId, ServerState)> {
        let inner = self.inner.read().await;
        let mut servers: Vec<_> = inner
            .servers
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect();
        servers.sort_unstable_by_key(|(id, _)| *id);
        servers
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.servers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.servers.is_empty()
    }

    /// Number of compactions performed so far.
    pub async fn compactions(&self) -> u64 {
        self.inner.read().await.compactions
    }
}

/// Move the surviving entries into a right-sized map and drop the old one.
fn compact(inner: &mut Inner) {
    let old = std::mem::take(&mut inner.servers);
    let mut servers = HashMap::with_capacity(old.len());
    servers.extend(old);

    debug!(
        survivors = servers.len(),
        removals = inner.removals,
        "state store compacted"
    );

    inner.servers = servers;
    inner.removals = 0;
    inner.compactions += 1;
}
