//! # kad-core
//!
//! Transport-agnostic protocol core of a Kademlia distributed hash table.
//!
//! The crate owns the hard parts of the protocol and nothing else: XOR
//! routing, the bounded routing table with head-probe eviction, the
//! ALPHA-parallel iterative lookup state machine, the four request handlers,
//! and the periodic replication/expiration/refresh loops. Everything that
//! talks to the outside world is a capability the embedder supplies:
//!
//! - [`DhtNetwork`]: delivers the outbound `PING`, `STORE`, `FIND_NODE` and
//!   `FIND_VALUE` RPCs. The core never sees addresses or wire bytes; a
//!   contact's address is an opaque string the transport knows how to dial.
//! - [`StorageAdapter`]: holds the stored values. The core forwards puts
//!   from the `STORE` handler, reads for `FIND_VALUE`, deletes from
//!   expiration, and streams the whole inventory for the replication
//!   predicates.
//!
//! The modules can be reused independently:
//!
//! - [`key`]: 160-bit fingerprints, XOR distance, bucket indexing, `hash160`.
//! - [`routing`]: [`Bucket`](routing::Bucket) and [`RoutingTable`].
//! - [`shortlist`]: the per-lookup [`ContactList`].
//! - [`node`]: the [`Node`] orchestrator and its iterative operations.
//! - [`protocol`]: the inbound request handlers.
//! - [`maintenance`]: refresh/replicate/expire and the jittered timers.
//!
//! ## Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kad_core::{key, Config, Contact, MemoryStorage, Node};
//! # use kad_core::{DhtNetwork, FindValueReply, Fingerprint, StoredItem};
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl DhtNetwork for MyTransport {
//! #     async fn ping(&self, _: &Contact) -> anyhow::Result<()> { Ok(()) }
//! #     async fn store(&self, _: &Contact, _: Fingerprint, _: StoredItem) -> anyhow::Result<()> { Ok(()) }
//! #     async fn find_node(&self, _: &Contact, _: Fingerprint) -> anyhow::Result<Vec<Contact>> { Ok(vec![]) }
//! #     async fn find_value(&self, _: &Contact, _: Fingerprint) -> anyhow::Result<FindValueReply> { Ok(FindValueReply::Closer(vec![])) }
//! # }
//!
//! # async fn launch(transport: MyTransport, seed: Contact) -> anyhow::Result<()> {
//! let identity = key::rand_fingerprint();
//! let contact = Contact { id: identity, addr: "tcp://127.0.0.1:4000".into() };
//! let node = Arc::new(Node::new(
//!     contact,
//!     transport,
//!     MemoryStorage::new(),
//!     Config::default(),
//! ));
//! node.join(seed).await?;
//! let tasks = node.clone().spawn_maintenance();
//! # let _ = tasks;
//! # Ok(())
//! # }
//! ```

pub mod contact;
pub mod error;
pub mod events;
pub mod key;
pub mod maintenance;
pub mod network;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod shortlist;
pub mod storage;

pub use contact::Contact;
pub use error::DhtError;
pub use events::DhtEvent;
pub use key::Fingerprint;
pub use maintenance::MaintenanceTasks;
pub use network::{DhtNetwork, FindValueReply};
pub use node::{Config, Node, NodeStats, StoreValue, ValueLookup};
pub use routing::RoutingTable;
pub use shortlist::ContactList;
pub use storage::{ItemMeta, MemoryStorage, StorageAdapter, StoredItem};

/// Bit width of the identifier space.
pub const B: usize = 160;

/// Number of bytes in a fingerprint.
pub const KEY_LEN: usize = B / 8;

/// Bucket capacity and lookup result size.
pub const K: usize = 20;

/// Lookup parallelism: in-flight RPCs per wave.
pub const ALPHA: usize = 3;

/// Alias result to the crate result.
pub type Result<T, E = error::DhtError> = core::result::Result<T, E>;

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
