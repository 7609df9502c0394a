//! ut2watch-query — talks to game servers over UDP.
//!
//! Implements the UT2004 native query protocol: one request per section
//! (server info, rules, players) sent to the query port, answered by one or
//! more datagrams. The engine only sees the [`QueryClient`] trait, so tests
//! can swap in a stub.
//!
//! # Architecture
//!
//! ```text
//! QueryClient (trait, dyn-compatible)
//!   └── UdpQueryClient
//!       ├── fresh ephemeral socket per query
//!       ├── codec::encode_request / decode_*
//!       └── overall deadline = QueryOptions::timeout
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod options;

pub use client::{BoxFuture, QueryClient, UdpQueryClient};
pub use error::{QueryError, QueryResult};
pub use options::QueryOptions;
