//! Observability events emitted by the node.

use crate::key::Fingerprint;

/// Notifications fanned out to [`Node::subscribe`](crate::Node::subscribe)
/// listeners.
///
/// Delivery is lossy by design: events go through a bounded broadcast
/// channel and are dropped when nobody is listening or a listener lags.
/// Nothing in the core depends on them being observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DhtEvent {
    /// A contact entered the routing table, or an existing entry was
    /// touched or re-addressed.
    ContactAdded(Fingerprint),
    /// A contact was removed after a failed head probe.
    ContactDeleted(Fingerprint),
    /// An inbound STORE was accepted and handed to the storage adapter.
    ValueStored(Fingerprint),
    /// An inbound FIND_VALUE was answered from the storage adapter.
    ValueRetrieved(Fingerprint),
}
