//! Registry — the set of servers to poll.
//!
//! Registrations are keyed by network address. Registering an address that
//! is already present updates the existing entry in place and keeps its id,
//! so state tracked under that id survives configuration reloads.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Persistence, Registration, ServerId};

#[derive(Default)]
struct Inner {
    registrations: BTreeMap<ServerId, Registration>,
    /// address → id, for upserts.
    by_address: HashMap<String, ServerId>,
    next_id: u64,
}

/// Thread-safe registry of servers to poll.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a registration, returning its id.
    ///
    /// If the address is already registered, its group, interval, timeout,
    /// persistence and link are replaced and the original id is kept.
    pub async fn register(&self, mut registration: Registration) -> ServerId {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if let Some(id) = inner.by_address.get(&registration.address).copied() {
            registration.id = id;
            debug!(%id, addr = %registration.address, "registration updated");
            inner.registrations.insert(id, registration);
            return id;
        }

        let id = ServerId(inner.next_id);
        inner.next_id += 1;
        registration.id = id;

        debug!(%id, addr = %registration.address, group = %registration.group, "server registered");
        inner.by_address.insert(registration.address.clone(), id);
        inner.registrations.insert(id, registration);
        id
    }

    /// Remove a registration. Unknown ids are ignored.
    pub async fn unregister(&self, id: ServerId) -> Option<Registration> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let removed = inner.registrations.remove(&id)?;
        inner.by_address.remove(&removed.address);
        debug!(%id, addr = %removed.address, "registration removed");
        Some(removed)
    }

    /// Remove a registration only if it is currently ephemeral.
    ///
    /// Checked and removed under one write lock, so a server that was
    /// re-registered as persistent in the meantime is left alone.
    pub async fn unregister_ephemeral(&self, id: ServerId) -> Option<Registration> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        match inner.registrations.get(&id) {
            Some(reg) if reg.persistence == Persistence::Ephemeral => {}
            _ => return None,
        }

        let removed = inner.registrations.remove(&id)?;
        inner.by_address.remove(&removed.address);
        debug!(%id, addr = %removed.address, "ephemeral registration removed");
        Some(removed)
    }

    /// Snapshot of all registrations, ordered by id.
    pub async fn registrations(&self) -> Vec<Registration> {
        let inner = self.inner.read().await;
        inner.registrations.values().cloned().collect()
    }

    /// Look up a registration by id.
    pub async fn get(&self, id: ServerId) -> Option<Registration> {
        let inner = self.inner.read().await;
        inner.registrations.get(&id).cloned()
    }

    /// Look up a registration by address.
    pub async fn get_by_address(&self, address: &str) -> Option<Registration> {
        let inner = self.inner.read().await;
        let id = inner.by_address.get(address)?;
        inner.registrations.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.registrations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.registrations.is_empty()
    }
}
