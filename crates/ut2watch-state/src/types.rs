//! Domain types for the ut2watch registry and state store.
//!
//! `Registration` is what we want to poll, `ServerState` is what we last
//! saw. The query result types (`ServerDetails` and friends) live here too
//! so the store can hold them without depending on the network crate.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default poll interval for a registration.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-query timeout for a registration.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Stable identifier assigned by the registry.
///
/// Ids are handed out in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Registration ───────────────────────────────────────────────────

/// Whether the failure-eviction policy may remove a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Never removed automatically (statically configured servers).
    #[default]
    Persistent,
    /// Removed after too many consecutive failed queries.
    Ephemeral,
}

/// A server the system intends to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Assigned by [`Registry::register`](crate::Registry::register); any
    /// value set by the caller is overwritten.
    pub id: ServerId,
    /// `host:port` of the game port. Unique across the registry.
    pub address: String,
    pub group: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub persistence: Persistence,
    pub external_link: Option<String>,
}

impl Registration {
    /// A persistent registration with default interval and timeout.
    pub fn new(address: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            id: ServerId(0),
            address: address.into(),
            group: group.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            persistence: Persistence::Persistent,
            external_link: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_external_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }

    pub fn is_ephemeral(&self) -> bool {
        self.persistence == Persistence::Ephemeral
    }
}

// ── Query results ──────────────────────────────────────────────────

/// Everything a successful query returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub info: ServerInfo,
    pub rules: Vec<Rule>,
    pub players: Vec<Player>,
}

/// Basic server information block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub map_name: String,
    pub game_type: String,
    pub current_players: u32,
    pub max_players: u32,
    pub game_port: u16,
    pub query_port: u16,
}

/// One server rule (key/value setting).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub key: String,
    pub value: String,
}

/// One connected player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub score: i32,
    pub ping: u32,
}

// ── Server state ───────────────────────────────────────────────────

/// Last-observed status for one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerState {
    pub online: bool,
    /// Consecutive failed queries. Reset to zero by any success.
    pub failures: u32,
    /// Present only while the last query succeeded.
    pub details: Option<ServerDetails>,
    /// Game address the registration last resolved to.
    pub resolved_address: Option<SocketAddr>,
    pub created: Instant,
    /// `None` until the first query completes.
    pub updated: Option<Instant>,
}

impl ServerState {
    pub(crate) fn new(created: Instant) -> Self {
        Self {
            online: false,
            failures: 0,
            details: None,
            resolved_address: None,
            created,
            updated: None,
        }
    }

    /// Time since the last completed query, if there was one.
    pub fn since_update(&self, now: Instant) -> Option<Duration> {
        self.updated.map(|at| now.saturating_duration_since(at))
    }
}

/// Outcome of one completed query, applied by `StateStore::update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub online: bool,
    pub details: Option<ServerDetails>,
    pub resolved_address: Option<SocketAddr>,
}

impl StateUpdate {
    /// The server answered.
    pub fn online(details: ServerDetails, resolved_address: SocketAddr) -> Self {
        Self {
            online: true,
            details: Some(details),
            resolved_address: Some(resolved_address),
        }
    }

    /// The server could not be resolved or did not answer.
    pub fn offline(resolved_address: Option<SocketAddr>) -> Self {
        Self {
            online: false,
            details: None,
            resolved_address,
        }
    }
}
