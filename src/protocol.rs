//! Inbound request handlers exposed to the transport layer.
//!
//! The transport deserializes whatever arrives on the wire and dispatches
//! it here; each handler completes exactly once through its return value.
//! Keys arrive in their wire form (lowercase hex) and are validated before
//! anything else is touched, and every handler first funnels the sender's
//! contact into the routing table, so merely talking to us is how peers get
//! learned.

use tracing::debug;

use crate::contact::Contact;
use crate::error::DhtError;
use crate::events::DhtEvent;
use crate::key::{self, Fingerprint};
use crate::network::{DhtNetwork, FindValueReply};
use crate::node::Node;
use crate::storage::{StorageAdapter, StoredItem};
use crate::{unix_millis, Result};

impl<N: DhtNetwork, S: StorageAdapter> Node<N, S> {
    /// `PING`: acknowledge with the current wall-clock timestamp.
    pub async fn handle_ping(&self, sender: Contact) -> u64 {
        self.update_contact(sender).await;
        unix_millis()
    }

    /// `STORE`: accept a keyed item offered by a peer.
    ///
    /// The key must be the `hash160` of the blob; anything else fails with
    /// [`DhtError::KeyHashMismatch`] before the storage adapter is
    /// involved. The RPC completes with whatever the adapter says.
    pub async fn handle_store(
        &self,
        key_hex: &str,
        item: StoredItem,
        sender: Contact,
    ) -> Result<()> {
        self.update_contact(sender).await;
        let key = key::from_hex(key_hex)?;
        if key::hash160(&item.blob) != key {
            return Err(DhtError::KeyHashMismatch);
        }
        self.storage
            .put(key, item)
            .await
            .map_err(DhtError::Storage)?;
        self.emit(DhtEvent::ValueStored(key));
        Ok(())
    }

    /// `FIND_NODE`: the closest contacts we know to the key.
    pub async fn handle_find_node(&self, key_hex: &str, sender: Contact) -> Result<Vec<Contact>> {
        self.update_contact(sender).await;
        let key = key::from_hex(key_hex)?;
        Ok(self.closest_to(&key).await)
    }

    /// `FIND_VALUE`: the stored item when we hold it, `FIND_NODE` semantics
    /// otherwise.
    ///
    /// A failing storage adapter counts as "not found"; the requester still
    /// gets contacts to continue its lookup with.
    pub async fn handle_find_value(
        &self,
        key_hex: &str,
        sender: Contact,
    ) -> Result<FindValueReply> {
        self.update_contact(sender).await;
        let key = key::from_hex(key_hex)?;

        match self.storage.get(&key).await {
            Ok(Some(item)) => {
                self.emit(DhtEvent::ValueRetrieved(key));
                return Ok(FindValueReply::Value(item));
            }
            Ok(None) => {}
            Err(err) => {
                debug!(key = key_hex, "storage get failed, serving contacts: {err:#}");
            }
        }
        Ok(FindValueReply::Closer(self.closest_to(&key).await))
    }

    async fn closest_to(&self, key: &Fingerprint) -> Vec<Contact> {
        let routing = self.routing.lock().await;
        routing.closest_contacts(key, self.config.bucket_size, false)
    }
}
