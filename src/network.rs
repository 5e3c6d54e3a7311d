//! The outbound RPC capability.

use async_trait::async_trait;

use crate::contact::Contact;
use crate::key::Fingerprint;
use crate::storage::StoredItem;

/// Reply to a `FIND_VALUE`, outbound or inbound.
#[derive(Clone, Debug)]
pub enum FindValueReply {
    /// The queried node held the value.
    Value(StoredItem),
    /// It did not; these are its closest contacts to the key.
    Closer(Vec<Contact>),
}

/// Transport capability for the four outbound RPCs.
///
/// Implementations own addressing, serialization, retries if any, and the
/// per-request timeout; they attach the local contact to every request so
/// the remote side can learn the caller. To the core every failure looks
/// the same: the probed contact simply never becomes active.
///
/// This trait abstracts the wire completely, so tests drive the node
/// through an in-process registry and production can put the RPCs on
/// whatever transport it likes.
#[async_trait]
pub trait DhtNetwork: Send + Sync + 'static {
    /// `PING`: resolves once the peer acknowledged.
    async fn ping(&self, to: &Contact) -> anyhow::Result<()>;

    /// `STORE`: place one keyed item on the peer.
    async fn store(&self, to: &Contact, key: Fingerprint, item: StoredItem) -> anyhow::Result<()>;

    /// `FIND_NODE`: the peer's closest contacts to the key.
    async fn find_node(&self, to: &Contact, key: Fingerprint) -> anyhow::Result<Vec<Contact>>;

    /// `FIND_VALUE`: the item if the peer holds it, its closest contacts
    /// otherwise.
    async fn find_value(&self, to: &Contact, key: Fingerprint) -> anyhow::Result<FindValueReply>;
}
