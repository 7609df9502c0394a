//! ut2watch-engine — decides when each registered server is queried.
//!
//! The [`QueryEngine`] ticks at a fixed resolution, compares every
//! registration's last update against its interval (plus random jitter so
//! servers added together drift apart), and hands due servers to worker
//! tasks. A semaphore caps concurrent queries and the [`PendingSet`] keeps
//! at most one query in flight per server.
//!
//! # Architecture
//!
//! ```text
//! QueryEngine::run
//!   └── tick loop (stop | cancel | deadline | interval)
//!       ├── Registry::registrations → StateStore::get_or_add
//!       ├── due? → PendingSet::try_mark → Semaphore::try_acquire_owned
//!       │     └── spawn worker: resolve → QueryClient::query → StateStore::update
//!       │                                      └── evict ephemeral after max_failures
//!       └── every prune_every ticks: StateStore::prune
//! ```

pub mod engine;
pub mod error;
pub mod pending;

pub use engine::{EngineConfig, QueryEngine};
pub use error::{EngineError, EngineResult};
pub use pending::{PendingGuard, PendingSet};
