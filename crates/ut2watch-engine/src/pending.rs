//! Set of servers with a query in flight.

use std::sync::Arc;

use dashmap::DashSet;
use ut2watch_state::ServerId;

/// Concurrent set of ids currently being queried.
///
/// Membership is held by a [`PendingGuard`]; dropping the guard (normal
/// return, error or panic unwinding) clears it.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    ids: Arc<DashSet<ServerId>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in flight. `None` if it already is.
    pub fn try_mark(&self, id: ServerId) -> Option<PendingGuard> {
        self.ids.insert(id).then(|| PendingGuard {
            ids: Arc::clone(&self.ids),
            id,
        })
    }

    pub fn contains(&self, id: ServerId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Keeps one id in its [`PendingSet`] until dropped.
#[derive(Debug)]
pub struct PendingGuard {
    ids: Arc<DashSet<ServerId>>,
    id: ServerId,
}

impl PendingGuard {
    pub fn id(&self) -> ServerId {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}
