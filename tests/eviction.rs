mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{NetworkRegistry, TestNode};
use kad_core::key::{self, rand_in_bucket_range};
use kad_core::{Contact, DhtEvent};

const LOCAL_HEX: &str = "aa48d3f07a5241291ed0b4cab6483fa8b8fcc128";
const BUCKET: usize = 30;

/// Distinct unregistered contacts that all route to the same bucket.
fn bucket_fillers(local: &key::Fingerprint, count: usize) -> Vec<Contact> {
    let mut seen = HashSet::new();
    let mut fillers = Vec::new();
    while fillers.len() < count {
        let id = rand_in_bucket_range(local, BUCKET);
        if seen.insert(id) {
            fillers.push(Contact {
                id,
                addr: format!("test://{}", key::to_hex(&id)),
            });
        }
    }
    fillers
}

#[tokio::test]
async fn a_dead_head_is_evicted_for_the_newcomer() {
    let registry = Arc::new(NetworkRegistry::default());
    let local = key::from_hex(LOCAL_HEX).unwrap();
    let main = TestNode::new(&registry, local).await;
    let mut events = main.node.subscribe();

    let fillers = bucket_fillers(&local, 21);
    let (newcomer, residents) = fillers.split_last().unwrap();
    for contact in residents {
        main.node.update_contact(contact.clone()).await;
    }
    // inserts land at the head slot, so the probe target is the most
    // recently inserted resident
    let head = residents.last().unwrap().clone();

    // nobody is registered, so the head probe fails and the head gives way
    main.node.update_contact(newcomer.clone()).await;

    assert_eq!(main.network.ping_calls().await, vec![head.id]);

    let closest_to_head = main.node.closest_contacts(&head.id, 1).await;
    assert_ne!(closest_to_head.first().map(|c| c.id), Some(head.id));
    let closest_to_newcomer = main.node.closest_contacts(&newcomer.id, 1).await;
    assert_eq!(closest_to_newcomer.first().map(|c| c.id), Some(newcomer.id));

    // drain events and confirm the eviction was announced
    let mut saw_delete = false;
    let mut saw_newcomer = false;
    while let Ok(event) = events.try_recv() {
        match event {
            DhtEvent::ContactDeleted(id) if id == head.id => saw_delete = true,
            DhtEvent::ContactAdded(id) if id == newcomer.id => saw_newcomer = true,
            _ => {}
        }
    }
    assert!(saw_delete);
    assert!(saw_newcomer);
}

#[tokio::test]
async fn a_healthy_head_survives_and_the_newcomer_is_dropped() {
    let registry = Arc::new(NetworkRegistry::default());
    let local = key::from_hex(LOCAL_HEX).unwrap();
    let main = TestNode::new(&registry, local).await;

    let fillers = bucket_fillers(&local, 21);
    let (newcomer, residents) = fillers.split_last().unwrap();
    for contact in &residents[..residents.len() - 1] {
        main.node.update_contact(contact.clone()).await;
    }

    // the head must answer its probe, so it is a live registered node,
    // inserted last to occupy the head slot
    let head = TestNode::new(&registry, residents[residents.len() - 1].id).await;
    main.node.update_contact(head.contact()).await;

    main.node.update_contact(newcomer.clone()).await;

    assert_eq!(main.network.ping_calls().await, vec![head.id()]);
    let closest_to_head = main.node.closest_contacts(&head.id(), 1).await;
    assert_eq!(closest_to_head.first().map(|c| c.id), Some(head.id()));
    let closest_to_newcomer = main.node.closest_contacts(&newcomer.id, 1).await;
    assert_ne!(closest_to_newcomer.first().map(|c| c.id), Some(newcomer.id));
}

#[tokio::test]
async fn a_fresh_probe_vouches_for_the_head_without_pinging_again() {
    let registry = Arc::new(NetworkRegistry::default());
    let local = key::from_hex(LOCAL_HEX).unwrap();
    let main = TestNode::new(&registry, local).await;

    let fillers = bucket_fillers(&local, 22);
    let newcomers = &fillers[20..];
    let residents = &fillers[..20];
    for contact in &residents[..19] {
        main.node.update_contact(contact.clone()).await;
    }
    let head = TestNode::new(&registry, residents[19].id).await;
    main.node.update_contact(head.contact()).await;

    // first overflow probes the head; it answers and is recorded
    main.node.update_contact(newcomers[0].clone()).await;
    assert_eq!(main.network.ping_calls().await.len(), 1);

    // second overflow within the freshness window skips the ping entirely
    main.node.update_contact(newcomers[1].clone()).await;
    assert_eq!(main.network.ping_calls().await.len(), 1);

    let closest = main.node.closest_contacts(&newcomers[1].id, 1).await;
    assert_ne!(closest.first().map(|c| c.id), Some(newcomers[1].id));
}
