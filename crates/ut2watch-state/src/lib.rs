//! ut2watch-state — registry and status store for ut2watch.
//!
//! Two independent in-memory services that the query engine and the API
//! share by `Arc`:
//!
//! - [`Registry`] holds the servers we want to poll, keyed by address, and
//!   hands out stable [`ServerId`]s.
//! - [`StateStore`] holds the last observed [`ServerState`] per id and
//!   periodically rebuilds its map to give memory back after churn.
//!
//! # Architecture
//!
//! ```text
//! Registry                          StateStore
//!   RwLock                            RwLock
//!   ├── BTreeMap<ServerId, Reg>       ├── HashMap<ServerId, ServerState>
//!   └── HashMap<address, ServerId>    └── removal counter → compaction
//! ```
//!
//! Every read returns an owned copy, so no lock outlives the call and
//! nothing is ever held across network I/O.

pub mod error;
pub mod registry;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use registry::Registry;
pub use store::{DEFAULT_MAX_PENDING_REMOVALS, StateStore};
pub use types::*;
