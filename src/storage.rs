//! Stored items and the storage capability.
//!
//! The core never persists values itself. Inbound `STORE`s, `FIND_VALUE`
//! reads, expiration deletes, and the replication scans all go through a
//! [`StorageAdapter`] the embedder supplies. [`MemoryStorage`] is the
//! bundled adapter for embedders without their own persistence, and for
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::key::Fingerprint;

/// Provenance metadata attached to every stored blob.
///
/// Replication and expiration decisions are made from these two fields
/// alone; the blob stays opaque.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Milliseconds since the Unix epoch at (re)publication time.
    pub timestamp: u64,
    /// Fingerprint of the node that published the value.
    pub publisher: Fingerprint,
}

/// A stored value: an opaque blob plus its provenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub blob: Vec<u8>,
    pub meta: ItemMeta,
}

/// Storage capability supplied by the embedder.
///
/// Errors are opaque to the core: a failing `get` during `FIND_VALUE` is
/// treated as "not found", and maintenance loops log failures and carry on.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Look up one item.
    async fn get(&self, key: &Fingerprint) -> anyhow::Result<Option<StoredItem>>;

    /// Insert or replace one item.
    async fn put(&self, key: Fingerprint, item: StoredItem) -> anyhow::Result<()>;

    /// Remove one item. Removing an absent key is not an error.
    async fn delete(&self, key: &Fingerprint) -> anyhow::Result<()>;

    /// A finite, restartable stream over every stored item.
    ///
    /// Consumers pull one item at a time (the replication and expiration
    /// loops fully process each item before asking for the next), so
    /// adapters may page from disk at their own rate.
    async fn scan(&self) -> anyhow::Result<BoxStream<'static, (Fingerprint, StoredItem)>>;
}

/// Hash-map adapter, suitable for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<Fingerprint, StoredItem>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get(&self, key: &Fingerprint) -> anyhow::Result<Option<StoredItem>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn put(&self, key: Fingerprint, item: StoredItem) -> anyhow::Result<()> {
        self.items.lock().await.insert(key, item);
        Ok(())
    }

    async fn delete(&self, key: &Fingerprint) -> anyhow::Result<()> {
        self.items.lock().await.remove(key);
        Ok(())
    }

    async fn scan(&self) -> anyhow::Result<BoxStream<'static, (Fingerprint, StoredItem)>> {
        // snapshot so the stream stays finite while writes continue
        let snapshot: Vec<(Fingerprint, StoredItem)> = self
            .items
            .lock()
            .await
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        Ok(stream::iter(snapshot).boxed())
    }
}
