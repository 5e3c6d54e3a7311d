#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use kad_core::key::{self, Fingerprint};
use kad_core::{
    Config, Contact, DhtNetwork, FindValueReply, MemoryStorage, Node, StoredItem,
};

pub type TestDht = Node<TestNetwork, MemoryStorage>;

/// In-process transport: routes RPCs straight into the handlers of other
/// registered nodes and records traffic for assertions.
#[derive(Clone)]
pub struct TestNetwork {
    registry: Arc<NetworkRegistry>,
    self_contact: Contact,
    /// peers whose every RPC fails
    dead: Arc<Mutex<HashSet<Fingerprint>>>,
    /// peers whose STORE fails while everything else works
    store_failures: Arc<Mutex<HashSet<Fingerprint>>>,
    ping_calls: Arc<Mutex<Vec<Fingerprint>>>,
    find_node_calls: Arc<Mutex<Vec<(Fingerprint, Fingerprint)>>>,
    store_calls: Arc<Mutex<Vec<(Fingerprint, Fingerprint)>>>,
}

impl TestNetwork {
    pub fn new(registry: Arc<NetworkRegistry>, self_contact: Contact) -> Self {
        Self {
            registry,
            self_contact,
            dead: Arc::new(Mutex::new(HashSet::new())),
            store_failures: Arc::new(Mutex::new(HashSet::new())),
            ping_calls: Arc::new(Mutex::new(Vec::new())),
            find_node_calls: Arc::new(Mutex::new(Vec::new())),
            store_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_dead(&self, peer: Fingerprint, dead: bool) {
        let mut set = self.dead.lock().await;
        if dead {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    pub async fn set_store_failure(&self, peer: Fingerprint, fail: bool) {
        let mut set = self.store_failures.lock().await;
        if fail {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    /// Fingerprints of every peer we pinged, in order.
    pub async fn ping_calls(&self) -> Vec<Fingerprint> {
        self.ping_calls.lock().await.clone()
    }

    /// `(peer, target)` of every FIND_NODE we dispatched.
    pub async fn find_node_calls(&self) -> Vec<(Fingerprint, Fingerprint)> {
        self.find_node_calls.lock().await.clone()
    }

    /// `(peer, key)` of every STORE we dispatched.
    pub async fn store_calls(&self) -> Vec<(Fingerprint, Fingerprint)> {
        self.store_calls.lock().await.clone()
    }

    async fn is_dead(&self, peer: &Fingerprint) -> bool {
        self.dead.lock().await.contains(peer)
    }
}

/// Shared directory of live test nodes.
#[derive(Default)]
pub struct NetworkRegistry {
    peers: RwLock<HashMap<Fingerprint, Arc<TestDht>>>,
}

impl NetworkRegistry {
    pub async fn register(&self, node: &Arc<TestDht>) {
        let mut peers = self.peers.write().await;
        peers.insert(node.contact().id, Arc::clone(node));
    }

    pub async fn get(&self, id: &Fingerprint) -> Option<Arc<TestDht>> {
        let peers = self.peers.read().await;
        peers.get(id).cloned()
    }
}

#[async_trait]
impl DhtNetwork for TestNetwork {
    async fn ping(&self, to: &Contact) -> Result<()> {
        self.ping_calls.lock().await.push(to.id);
        if self.is_dead(&to.id).await {
            return Err(anyhow!("injected failure"));
        }
        match self.registry.get(&to.id).await {
            Some(peer) => {
                peer.handle_ping(self.self_contact.clone()).await;
                Ok(())
            }
            None => Err(anyhow!("no route to peer")),
        }
    }

    async fn store(&self, to: &Contact, key: Fingerprint, item: StoredItem) -> Result<()> {
        self.store_calls.lock().await.push((to.id, key));
        if self.is_dead(&to.id).await || self.store_failures.lock().await.contains(&to.id) {
            return Err(anyhow!("injected failure"));
        }
        match self.registry.get(&to.id).await {
            Some(peer) => peer
                .handle_store(&key::to_hex(&key), item, self.self_contact.clone())
                .await
                .map_err(anyhow::Error::from),
            None => Err(anyhow!("no route to peer")),
        }
    }

    async fn find_node(&self, to: &Contact, key: Fingerprint) -> Result<Vec<Contact>> {
        self.find_node_calls.lock().await.push((to.id, key));
        if self.is_dead(&to.id).await {
            return Err(anyhow!("injected failure"));
        }
        match self.registry.get(&to.id).await {
            Some(peer) => peer
                .handle_find_node(&key::to_hex(&key), self.self_contact.clone())
                .await
                .map_err(anyhow::Error::from),
            None => Err(anyhow!("no route to peer")),
        }
    }

    async fn find_value(&self, to: &Contact, key: Fingerprint) -> Result<FindValueReply> {
        if self.is_dead(&to.id).await {
            return Err(anyhow!("injected failure"));
        }
        match self.registry.get(&to.id).await {
            Some(peer) => peer
                .handle_find_value(&key::to_hex(&key), self.self_contact.clone())
                .await
                .map_err(anyhow::Error::from),
            None => Err(anyhow!("no route to peer")),
        }
    }
}

/// One node wired into the in-process network.
pub struct TestNode {
    pub node: Arc<TestDht>,
    pub network: TestNetwork,
}

impl TestNode {
    pub async fn new(registry: &Arc<NetworkRegistry>, id: Fingerprint) -> Self {
        Self::with_config(registry, id, Config::default()).await
    }

    pub async fn with_config(
        registry: &Arc<NetworkRegistry>,
        id: Fingerprint,
        config: Config,
    ) -> Self {
        let contact = Contact {
            id,
            addr: format!("test://{}", key::to_hex(&id)),
        };
        let network = TestNetwork::new(Arc::clone(registry), contact.clone());
        let node = Arc::new(Node::new(contact, network.clone(), MemoryStorage::new(), config));
        registry.register(&node).await;
        Self { node, network }
    }

    pub fn contact(&self) -> Contact {
        self.node.contact()
    }

    pub fn id(&self) -> Fingerprint {
        *self.node.id()
    }
}

/// Deterministic fingerprint with `n` in the low bytes.
pub fn fp(n: u64) -> Fingerprint {
    let mut id = [0u8; 20];
    id[12..].copy_from_slice(&n.to_be_bytes());
    id
}

/// Wire two nodes so each knows the other.
pub async fn introduce(a: &TestNode, b: &TestNode) {
    a.node.update_contact(b.contact()).await;
    b.node.update_contact(a.contact()).await;
}
