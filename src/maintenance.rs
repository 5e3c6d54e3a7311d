//! Background upkeep: bucket refresh, replication, expiration, and the
//! jittered timers that drive them.
//!
//! Every loop here is best-effort. Failures are logged and skipped; nothing
//! in this module can take the node down.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::key::{self, Fingerprint};
use crate::network::DhtNetwork;
use crate::node::Node;
use crate::storage::{StorageAdapter, StoredItem};
use crate::{unix_millis, B};

impl<N: DhtNetwork, S: StorageAdapter> Node<N, S> {
    /// Refresh stale buckets at `start` and beyond.
    ///
    /// Visits the candidate buckets in uniformly random order. A bucket is
    /// stale when no lookup has been aimed into it for
    /// `refresh_interval`; each stale bucket gets a lookup for a random
    /// key in its distance range, and every contact that lookup surfaces
    /// is offered back to the routing table. Stops early after
    /// `max_unimproved_refreshes` consecutive rounds that discovered no
    /// new fingerprint.
    pub async fn refresh(&self, start: usize) {
        let mut indices: Vec<usize> = (start.min(B)..B).collect();
        {
            let mut rng = rand::thread_rng();
            indices.shuffle(&mut rng);
        }

        let mut discovered: HashSet<Fingerprint> = HashSet::new();
        let mut unimproved = 0usize;

        for index in indices {
            let stale = {
                let lookups = self.lookups.lock().await;
                lookups[index]
                    .map_or(true, |at| at.elapsed() >= self.config.refresh_interval)
            };
            if !stale {
                continue;
            }

            let target = key::rand_in_bucket_range(self.id(), index);
            let found = self.iterative_find_node(target).await;

            let mut improved = false;
            for contact in found {
                if discovered.insert(contact.id) {
                    improved = true;
                }
                self.update_contact(contact).await;
            }

            if improved {
                unimproved = 0;
            } else {
                unimproved += 1;
                if unimproved >= self.config.max_unimproved_refreshes {
                    debug!(rounds = unimproved, "refresh stalled, stopping early");
                    break;
                }
            }
        }
    }

    /// Re-publish our own aged items and re-replicate foreign ones.
    ///
    /// Streams the storage inventory one item at a time. Items we
    /// published go back out after `republish_interval`; items others
    /// published go back out after `replicate_interval`; everything
    /// younger is skipped.
    pub async fn replicate(&self) {
        let mut scan = match self.storage.scan().await {
            Ok(scan) => scan,
            Err(err) => {
                warn!("replicate scan failed: {err:#}");
                return;
            }
        };

        let now = unix_millis();
        while let Some((hash, item)) = scan.next().await {
            if !self.wants_replication(&item, now) {
                continue;
            }
            match self.iterative_store(hash, item).await {
                Ok(stored) => {
                    debug!(key = %key::short_hex(&hash), stored, "replicated");
                }
                Err(err) => {
                    warn!(key = %key::short_hex(&hash), "replication failed: {err:#}");
                }
            }
        }
    }

    fn wants_replication(&self, item: &StoredItem, now: u64) -> bool {
        let age_limit = if item.meta.publisher == *self.id() {
            self.config.republish_interval
        } else {
            self.config.replicate_interval
        };
        item.meta.timestamp + age_limit.as_millis() as u64 <= now
    }

    /// Delete every stored item past its lifetime.
    pub async fn expire(&self) {
        let mut scan = match self.storage.scan().await {
            Ok(scan) => scan,
            Err(err) => {
                warn!("expire scan failed: {err:#}");
                return;
            }
        };

        let now = unix_millis();
        let lifetime = self.config.expire_interval.as_millis() as u64;
        while let Some((hash, item)) = scan.next().await {
            if item.meta.timestamp + lifetime > now {
                continue;
            }
            if let Err(err) = self.storage.delete(&hash).await {
                warn!(key = %key::short_hex(&hash), "expire delete failed: {err:#}");
            }
        }
    }

    /// Start the periodic refresh and replicate/expire timers.
    ///
    /// Each timer re-arms edge-triggered after its work completes, adding a
    /// fresh uniform delay in `[0, max_jitter)` per firing so synchronized
    /// nodes drift apart instead of convoying.
    pub fn spawn_maintenance(self: Arc<Self>) -> MaintenanceTasks {
        let refresh = {
            let node = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    sleep(jittered(node.config.refresh_interval, node.config.max_jitter)).await;
                    node.refresh(0).await;
                }
            })
        };
        let replicate = {
            let node = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    sleep(jittered(
                        node.config.replicate_interval,
                        node.config.max_jitter,
                    ))
                    .await;
                    node.replicate().await;
                    node.expire().await;
                }
            })
        };
        MaintenanceTasks { refresh, replicate }
    }
}

/// `base` plus a uniform random share of `jitter`.
fn jittered(base: Duration, jitter: Duration) -> Duration {
    let spread = jitter.as_millis() as u64;
    if spread == 0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..spread);
    base + Duration::from_millis(extra)
}

/// Handles on the two background timers.
///
/// Dropping the handles leaves the timers running; call
/// [`abort`](MaintenanceTasks::abort) to stop them.
pub struct MaintenanceTasks {
    refresh: JoinHandle<()>,
    replicate: JoinHandle<()>,
}

impl MaintenanceTasks {
    /// Stop both timers.
    pub fn abort(&self) {
        self.refresh.abort();
        self.replicate.abort();
    }
}
