//! Node orchestration: iterative lookups, stores, and the head-probe
//! eviction discipline.
//!
//! A [`Node`] owns the routing table, the probe-throttle cache, and the
//! per-bucket lookup timestamps, and drives everything through the two
//! capabilities the embedder supplies ([`DhtNetwork`], [`StorageAdapter`]).
//! All routing-table mutation funnels through [`Node::update_contact`], so
//! the table only ever sees serialized access behind the node's lock.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use lru::LruCache;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::contact::Contact;
use crate::error::DhtError;
use crate::events::DhtEvent;
use crate::key::{self, Fingerprint};
use crate::network::{DhtNetwork, FindValueReply};
use crate::routing::{BucketSet, RoutingTable};
use crate::shortlist::ContactList;
use crate::storage::{ItemMeta, StorageAdapter, StoredItem};
use crate::{unix_millis, Result, ALPHA, B, K};

/// Bound on the probe-throttle cache; old records age out via LRU.
const PROBE_CACHE_CAPACITY: usize = 4096;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Tunable widths and intervals.
///
/// Defaults follow the Kademlia paper; tests shrink the intervals, and
/// embedders on unusual networks may want a different jitter spread.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bucket capacity and lookup result size (K).
    pub bucket_size: usize,
    /// In-flight RPCs per lookup wave (ALPHA).
    pub alpha: usize,
    /// How long a bucket may go without a lookup before refresh retargets it.
    pub refresh_interval: Duration,
    /// Age at which a foreign item is re-replicated.
    pub replicate_interval: Duration,
    /// Age at which our own items are re-published.
    pub republish_interval: Duration,
    /// Age at which stored items are dropped.
    pub expire_interval: Duration,
    /// How long a successful head probe vouches for a bucket head.
    pub ping_freshness: Duration,
    /// Upper bound of the uniform random delay added to each timer firing.
    pub max_jitter: Duration,
    /// Refresh stops early after this many rounds without a new fingerprint.
    pub max_unimproved_refreshes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_size: K,
            alpha: ALPHA,
            refresh_interval: Duration::from_secs(3600),
            replicate_interval: Duration::from_secs(3600),
            republish_interval: Duration::from_secs(86_400),
            expire_interval: Duration::from_secs(86_400),
            ping_freshness: Duration::from_secs(600),
            max_jitter: Duration::from_secs(1800),
            max_unimproved_refreshes: 4,
        }
    }
}

/// Result of a head probe, kept to throttle repeat probes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProbeRecord {
    pub(crate) at: Instant,
    pub(crate) responded: bool,
}

/// Outcome of [`Node::iterative_find_value`].
#[derive(Clone, Debug)]
pub enum ValueLookup {
    /// The first value any queried contact returned.
    Found(StoredItem),
    /// No value anywhere; the closest active contacts instead.
    Closest(Vec<Contact>),
}

/// Value accepted by [`Node::iterative_store`].
///
/// Raw bytes are wrapped with a fresh timestamp under the local publisher;
/// a pre-shaped item keeps its publisher and gets its timestamp refreshed
/// (republishing restarts the expiration clock).
#[derive(Clone, Debug)]
pub enum StoreValue {
    Blob(Vec<u8>),
    Item(StoredItem),
}

impl From<Vec<u8>> for StoreValue {
    fn from(blob: Vec<u8>) -> Self {
        Self::Blob(blob)
    }
}

impl From<&[u8]> for StoreValue {
    fn from(blob: &[u8]) -> Self {
        Self::Blob(blob.to_vec())
    }
}

impl From<StoredItem> for StoreValue {
    fn from(item: StoredItem) -> Self {
        Self::Item(item)
    }
}

/// Snapshot of node state for diagnostics.
#[derive(Clone, Debug)]
pub struct NodeStats {
    pub id: Fingerprint,
    /// Contacts across all buckets.
    pub contacts: usize,
    /// Buckets holding at least one contact.
    pub occupied_buckets: usize,
}

/// What one wave probe came back with.
enum WaveReply {
    Nodes(Vec<Contact>),
    Value(StoredItem),
    Miss(anyhow::Error),
}

/// The DHT orchestrator.
///
/// `Node` is `Arc`-friendly: wrap it once and share it between the
/// transport's inbound dispatch, your application, and the maintenance
/// tasks.
pub struct Node<N: DhtNetwork, S: StorageAdapter> {
    pub(crate) self_contact: Contact,
    pub(crate) config: Config,
    pub(crate) routing: Mutex<RoutingTable>,
    pub(crate) storage: Arc<S>,
    pub(crate) network: Arc<N>,
    /// fingerprint of a probed bucket head -> most recent probe outcome
    pub(crate) pings: Mutex<LruCache<Fingerprint, ProbeRecord>>,
    /// bucket index -> instant of the last lookup aimed into it
    pub(crate) lookups: Mutex<Vec<Option<Instant>>>,
    pub(crate) events: broadcast::Sender<DhtEvent>,
}

impl<N: DhtNetwork, S: StorageAdapter> Node<N, S> {
    pub fn new(self_contact: Contact, network: N, storage: S, config: Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let routing = RoutingTable::new(self_contact.id, config.bucket_size);
        let probe_capacity =
            NonZeroUsize::new(PROBE_CACHE_CAPACITY).expect("capacity must be non-zero");
        Self {
            self_contact,
            config,
            routing: Mutex::new(routing),
            storage: Arc::new(storage),
            network: Arc::new(network),
            pings: Mutex::new(LruCache::new(probe_capacity)),
            lookups: Mutex::new(vec![None; B]),
            events,
        }
    }

    pub fn id(&self) -> &Fingerprint {
        &self.self_contact.id
    }

    pub fn contact(&self) -> Contact {
        self.self_contact.clone()
    }

    /// Handle on the storage adapter this node was built with.
    pub fn storage(&self) -> Arc<S> {
        Arc::clone(&self.storage)
    }

    /// Listen for [`DhtEvent`]s. Lossy; see [`DhtEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<DhtEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: DhtEvent) {
        let _ = self.events.send(event);
    }

    /// The closest contacts to `key` known locally.
    pub async fn closest_contacts(&self, key: &Fingerprint, count: usize) -> Vec<Contact> {
        self.routing.lock().await.closest_contacts(key, count, false)
    }

    pub async fn stats(&self) -> NodeStats {
        let routing = self.routing.lock().await;
        NodeStats {
            id: self.self_contact.id,
            contacts: routing.size(),
            occupied_buckets: routing.occupied_buckets(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Contact intake
    // ─────────────────────────────────────────────────────────────────────

    /// Offer a learned contact to the routing table.
    ///
    /// Accepted or touched contacts are announced as
    /// [`DhtEvent::ContactAdded`]. When the target bucket is full the head
    /// is probed: a head that recently answered a probe, or answers this
    /// one, survives and the newcomer is dropped; a head that fails the
    /// probe is evicted in the newcomer's favor.
    pub async fn update_contact(&self, contact: Contact) {
        if contact.id == self.self_contact.id {
            return;
        }
        let outcome = { self.routing.lock().await.add(contact.clone()) };
        match outcome {
            Some((_, BucketSet::Inserted)) | Some((_, BucketSet::Refreshed(_))) => {
                self.emit(DhtEvent::ContactAdded(contact.id));
            }
            Some((bucket, BucketSet::Full)) => self.probe_bucket_head(bucket, contact).await,
            None => {}
        }
    }

    /// Ping the head of a full bucket and decide between the resident and
    /// the newcomer.
    async fn probe_bucket_head(&self, bucket: usize, newcomer: Contact) {
        let head = {
            let routing = self.routing.lock().await;
            routing.bucket(bucket).head().cloned()
        };
        let Some(head) = head else { return };

        // A recent successful probe vouches for the head; skip the ping and
        // drop the newcomer.
        let vouched = {
            let mut pings = self.pings.lock().await;
            pings
                .get(&head.id)
                .map_or(false, |record| {
                    record.responded && record.at.elapsed() < self.config.ping_freshness
                })
        };
        if vouched {
            return;
        }

        match self.network.ping(&head).await {
            Ok(()) => {
                self.pings.lock().await.put(
                    head.id,
                    ProbeRecord {
                        at: Instant::now(),
                        responded: true,
                    },
                );
            }
            Err(err) => {
                debug!(head = %key::short_hex(&head.id), "head probe failed: {err:#}");
                self.pings.lock().await.put(
                    head.id,
                    ProbeRecord {
                        at: Instant::now(),
                        responded: false,
                    },
                );
                let (removed, added) = {
                    let mut routing = self.routing.lock().await;
                    let removed = routing.remove(&head.id);
                    let added = routing.add(newcomer.clone());
                    (removed, added)
                };
                if removed.is_some() {
                    self.emit(DhtEvent::ContactDeleted(head.id));
                }
                if matches!(
                    added,
                    Some((_, BucketSet::Inserted)) | Some((_, BucketSet::Refreshed(_)))
                ) {
                    self.emit(DhtEvent::ContactAdded(newcomer.id));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Iterative operations
    // ─────────────────────────────────────────────────────────────────────

    /// Measure the round trip to a contact.
    pub async fn ping(&self, contact: &Contact) -> Result<Duration> {
        let started = Instant::now();
        self.network
            .ping(contact)
            .await
            .map_err(DhtError::Transport)?;
        Ok(started.elapsed())
    }

    /// Locate the up-to-K active contacts closest to `key`.
    ///
    /// Never fails: transport errors only cost the lookup that one probe,
    /// and an unreachable network resolves to an empty result.
    pub async fn iterative_find_node(&self, key: Fingerprint) -> Vec<Contact> {
        self.iterative_lookup(key, false).await.1
    }

    /// Locate a stored value, or the closest active contacts to its key.
    ///
    /// When a value turns up, a fire-and-forget `STORE` caches it at the
    /// closest active contact that answered without it.
    pub async fn iterative_find_value(&self, key: Fingerprint) -> ValueLookup {
        match self.iterative_lookup(key, true).await {
            (Some(item), _) => ValueLookup::Found(item),
            (None, closest) => ValueLookup::Closest(closest),
        }
    }

    /// The shared lookup core: ALPHA-wide waves over a distance-sorted
    /// shortlist until progress stalls or K contacts have answered.
    async fn iterative_lookup(
        &self,
        key: Fingerprint,
        find_value: bool,
    ) -> (Option<StoredItem>, Vec<Contact>) {
        let alpha = self.config.alpha.max(1);
        let k = self.config.bucket_size.max(1);

        if let Some(index) = key::bucket_index(&self.self_contact.id, &key) {
            self.lookups.lock().await[index] = Some(Instant::now());
        }

        let seeds = {
            let routing = self.routing.lock().await;
            routing.closest_contacts(&key, alpha, false)
        };
        let mut shortlist = ContactList::new(key, seeds);
        let mut best = shortlist.closest().map(|c| key::distance(&c.id, &key));
        let mut finishing = false;

        loop {
            // a finishing trip widens the last wave to K candidates
            let wave_width = if finishing { k } else { alpha };
            let wave: Vec<Contact> = shortlist
                .uncontacted()
                .into_iter()
                .take(wave_width)
                .collect();
            if wave.is_empty() {
                break;
            }
            for contact in &wave {
                shortlist.mark_contacted(contact);
            }

            let replies = future::join_all(wave.into_iter().map(|contact| {
                let network = Arc::clone(&self.network);
                async move {
                    let reply = if find_value {
                        match network.find_value(&contact, key).await {
                            Ok(FindValueReply::Value(item)) => WaveReply::Value(item),
                            Ok(FindValueReply::Closer(nodes)) => WaveReply::Nodes(nodes),
                            Err(err) => WaveReply::Miss(err),
                        }
                    } else {
                        match network.find_node(&contact, key).await {
                            Ok(nodes) => WaveReply::Nodes(nodes),
                            Err(err) => WaveReply::Miss(err),
                        }
                    };
                    (contact, reply)
                }
            }))
            .await;

            for (contact, reply) in replies {
                match reply {
                    WaveReply::Miss(err) => {
                        // the contact stays contacted but never active
                        debug!(peer = %key::short_hex(&contact.id), "lookup probe failed: {err:#}");
                    }
                    WaveReply::Nodes(mut nodes) => {
                        shortlist.mark_responded(&contact);
                        nodes.retain(|c| c.id != self.self_contact.id);
                        for discovered in shortlist.add(nodes) {
                            self.update_contact(discovered).await;
                        }
                    }
                    WaveReply::Value(item) => {
                        shortlist.mark_responded(&contact);
                        self.cache_at_closest_active(&shortlist, &contact, item.clone());
                        return (Some(item), shortlist.active());
                    }
                }
            }

            let active = shortlist.active();
            if active.len() >= k {
                return (None, active.into_iter().take(k).collect());
            }
            if finishing {
                break;
            }

            let closest_now = shortlist.closest().map(|c| key::distance(&c.id, &key));
            let improved = match (&closest_now, &best) {
                (Some(now), Some(prev)) => now < prev,
                (Some(_), None) => true,
                _ => false,
            };
            if improved {
                best = closest_now;
            } else {
                // nothing closer surfaced; take one last K-wide trip and
                // settle for whatever it brings
                finishing = true;
            }
        }

        (None, shortlist.active().into_iter().take(k).collect())
    }

    /// Fire-and-forget `STORE` of a found value to the closest active
    /// contact that answered without it.
    fn cache_at_closest_active(&self, shortlist: &ContactList, holder: &Contact, item: StoredItem) {
        let Some(target) = shortlist
            .active()
            .into_iter()
            .find(|c| c.id != holder.id)
        else {
            return;
        };
        let network = Arc::clone(&self.network);
        let key = *shortlist.key();
        tokio::spawn(async move {
            if let Err(err) = network.store(&target, key, item).await {
                debug!(peer = %key::short_hex(&target.id), "store-back failed: {err:#}");
            }
        });
    }

    /// Publish a value to the K contacts closest to `key`.
    ///
    /// Resolves with the number of contacts that confirmed the store, or
    /// [`DhtError::NoStorageTargets`] when nobody did.
    pub async fn iterative_store(
        &self,
        key: Fingerprint,
        value: impl Into<StoreValue>,
    ) -> Result<usize> {
        let item = self.materialize(value.into());
        let targets = self.iterative_find_node(key).await;

        // ALPHA workers drain one shared cursor over the targets
        let mut confirmations = stream::iter(targets)
            .map(|target| {
                let network = Arc::clone(&self.network);
                let item = item.clone();
                async move {
                    let peer = target.id;
                    (peer, network.store(&target, key, item).await)
                }
            })
            .buffer_unordered(self.config.alpha.max(1));

        let mut stored = 0usize;
        while let Some((peer, outcome)) = confirmations.next().await {
            match outcome {
                Ok(()) => stored += 1,
                Err(err) => {
                    debug!(peer = %key::short_hex(&peer), "store rejected: {err:#}");
                }
            }
        }

        if stored == 0 {
            return Err(DhtError::NoStorageTargets);
        }
        Ok(stored)
    }

    fn materialize(&self, value: StoreValue) -> StoredItem {
        match value {
            StoreValue::Blob(blob) => StoredItem {
                blob,
                meta: ItemMeta {
                    timestamp: unix_millis(),
                    publisher: self.self_contact.id,
                },
            },
            StoreValue::Item(mut item) => {
                item.meta.timestamp = unix_millis();
                item
            }
        }
    }

    /// Bootstrap from a seed contact.
    ///
    /// Inserts the seed, looks up the local identity to populate the
    /// nearest neighborhood, then refreshes every bucket strictly further
    /// than the closest occupied one. Fails with [`DhtError::JoinFailed`]
    /// when the identity lookup reaches nobody.
    pub async fn join(&self, seed: Contact) -> Result<()> {
        self.update_contact(seed).await;

        let found = self.iterative_find_node(self.self_contact.id).await;
        if found.is_empty() {
            return Err(DhtError::JoinFailed);
        }

        let start = {
            let routing = self.routing.lock().await;
            routing.closest_bucket_index() + 1
        };
        self.refresh(start).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::rand_fingerprint;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    /// A transport where nobody answers.
    struct SilentNetwork;

    #[async_trait]
    impl DhtNetwork for SilentNetwork {
        async fn ping(&self, _to: &Contact) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("unreachable"))
        }
        async fn store(
            &self,
            _to: &Contact,
            _key: Fingerprint,
            _item: StoredItem,
        ) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("unreachable"))
        }
        async fn find_node(
            &self,
            _to: &Contact,
            _key: Fingerprint,
        ) -> anyhow::Result<Vec<Contact>> {
            Err(anyhow::anyhow!("unreachable"))
        }
        async fn find_value(
            &self,
            _to: &Contact,
            _key: Fingerprint,
        ) -> anyhow::Result<FindValueReply> {
            Err(anyhow::anyhow!("unreachable"))
        }
    }

    fn lone_node() -> Node<SilentNetwork, MemoryStorage> {
        let contact = Contact {
            id: rand_fingerprint(),
            addr: "test://local".into(),
        };
        Node::new(contact, SilentNetwork, MemoryStorage::new(), Config::default())
    }

    #[tokio::test]
    async fn materialize_wraps_blobs_under_the_local_publisher() {
        let node = lone_node();
        let item = node.materialize(StoreValue::Blob(b"payload".to_vec()));
        assert_eq!(item.blob, b"payload");
        assert_eq!(item.meta.publisher, *node.id());
        assert!(item.meta.timestamp > 0);
    }

    #[tokio::test]
    async fn materialize_refreshes_the_timestamp_on_republish() {
        let node = lone_node();
        let stale = StoredItem {
            blob: b"payload".to_vec(),
            meta: ItemMeta {
                timestamp: 1,
                publisher: rand_fingerprint(),
            },
        };
        let publisher = stale.meta.publisher;
        let republished = node.materialize(StoreValue::Item(stale));
        assert!(republished.meta.timestamp > 1);
        assert_eq!(republished.meta.publisher, publisher);
    }

    #[tokio::test]
    async fn lookup_on_a_silent_network_resolves_empty() {
        let node = lone_node();
        let peer = Contact {
            id: rand_fingerprint(),
            addr: "test://peer".into(),
        };
        node.update_contact(peer).await;

        let found = node.iterative_find_node(rand_fingerprint()).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn lookups_stamp_the_target_bucket() {
        let node = lone_node();
        let target = key::rand_in_bucket_range(node.id(), 17);

        node.iterative_find_node(target).await;

        let lookups = node.lookups.lock().await;
        assert!(lookups[17].is_some());
        assert!(lookups[18].is_none());
    }

    #[tokio::test]
    async fn iterative_store_without_targets_fails() {
        let node = lone_node();
        let blob = b"payload".to_vec();
        let key = key::hash160(&blob);
        assert!(matches!(
            node.iterative_store(key, blob).await,
            Err(DhtError::NoStorageTargets)
        ));
    }
}
