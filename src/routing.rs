//! Buckets and the routing table.
//!
//! The table holds `B` buckets, one per possible position of the most
//! significant differing bit between the local identity and a foreign
//! fingerprint. Each bucket is a capacity-bounded, insertion-ordered map
//! whose head is the probe target when the bucket overflows. The table
//! itself never evicts; overflow is reported to the caller, which applies
//! the head-probe discipline.

use crate::contact::Contact;
use crate::key::{self, Fingerprint};
use crate::B;

// ─────────────────────────────────────────────────────────────────────────────
// Bucket
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of offering a contact to a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketSet {
    /// New contact placed at the head slot (position 0).
    Inserted,
    /// The contact was already present: its stored address was replaced and
    /// the entry moved to the tail. Carries the new position.
    Refreshed(usize),
    /// Bucket at capacity; nothing was mutated.
    Full,
}

/// A capacity-bounded, insertion-ordered fingerprint-to-contact map.
///
/// The head is the entry that has gone longest without being touched (the
/// probe target on overflow); the tail is the most recently touched entry.
#[derive(Clone, Debug)]
pub struct Bucket {
    entries: Vec<Contact>,
    capacity: usize,
}

impl Bucket {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Insert or touch a contact.
    ///
    /// - Present: the stored entry is replaced (addresses may change) and
    ///   moved to the tail.
    /// - Absent with room: the contact is inserted at the head.
    /// - Absent and full: [`BucketSet::Full`], and the bucket is unchanged.
    pub fn set(&mut self, contact: Contact) -> BucketSet {
        if let Some(pos) = self.entries.iter().position(|c| c.id == contact.id) {
            self.entries.remove(pos);
            self.entries.push(contact);
            return BucketSet::Refreshed(self.entries.len() - 1);
        }
        if self.is_full() {
            return BucketSet::Full;
        }
        self.entries.insert(0, contact);
        BucketSet::Inserted
    }

    pub fn head(&self) -> Option<&Contact> {
        self.entries.first()
    }

    pub fn tail(&self) -> Option<&Contact> {
        self.entries.last()
    }

    pub fn get(&self, id: &Fingerprint) -> Option<&Contact> {
        self.entries.iter().find(|c| &c.id == id)
    }

    /// Position of a contact within the bucket, head first.
    pub fn position(&self, id: &Fingerprint) -> Option<usize> {
        self.entries.iter().position(|c| &c.id == id)
    }

    pub fn remove(&mut self, id: &Fingerprint) -> Option<Contact> {
        let pos = self.position(id)?;
        Some(self.entries.remove(pos))
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.entries
    }

    /// Up to `count` entries sorted ascending by XOR distance to `key`.
    ///
    /// With `exclusive` set, an entry whose fingerprint equals `key` is
    /// omitted.
    pub fn closest_to(&self, key: &Fingerprint, count: usize, exclusive: bool) -> Vec<Contact> {
        let mut out: Vec<Contact> = self
            .entries
            .iter()
            .filter(|c| !(exclusive && &c.id == key))
            .cloned()
            .collect();
        out.sort_by(|a, b| key::distance(&a.id, key).cmp(&key::distance(&b.id, key)));
        out.truncate(count);
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing table
// ─────────────────────────────────────────────────────────────────────────────

/// The `B`-bucket Kademlia routing table.
///
/// A contact with fingerprint `f` lives only in the bucket at
/// `bucket_index(local, f)`; the local fingerprint is never stored. The
/// table is not concurrency-safe; the [`Node`](crate::Node) serializes
/// access behind its own lock.
#[derive(Debug)]
pub struct RoutingTable {
    local: Fingerprint,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    pub fn new(local: Fingerprint, bucket_size: usize) -> Self {
        Self {
            local,
            buckets: (0..B).map(|_| Bucket::new(bucket_size)).collect(),
        }
    }

    pub fn local(&self) -> &Fingerprint {
        &self.local
    }

    /// Total number of stored contacts.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Number of buckets (`B`).
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Number of buckets holding at least one contact.
    pub fn occupied_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| !b.is_empty()).count()
    }

    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    /// Bucket index a fingerprint routes to, `None` for the local identity.
    pub fn bucket_of(&self, id: &Fingerprint) -> Option<usize> {
        key::bucket_index(&self.local, id)
    }

    /// Offer a contact to its bucket.
    ///
    /// Returns the bucket index and what the bucket did with it, or `None`
    /// when the contact carries the local fingerprint. A [`BucketSet::Full`]
    /// outcome is the overflow signal; the caller decides whether the head
    /// survives.
    pub fn add(&mut self, contact: Contact) -> Option<(usize, BucketSet)> {
        let index = key::bucket_index(&self.local, &contact.id)?;
        Some((index, self.buckets[index].set(contact)))
    }

    pub fn remove(&mut self, id: &Fingerprint) -> Option<Contact> {
        let index = key::bucket_index(&self.local, id)?;
        self.buckets[index].remove(id)
    }

    pub fn get(&self, id: &Fingerprint) -> Option<&Contact> {
        let index = key::bucket_index(&self.local, id)?;
        self.buckets[index].get(id)
    }

    /// Lowest-index non-empty bucket, or `B - 1` when the table is empty.
    ///
    /// Join uses this to decide which buckets are worth refreshing: those
    /// strictly further than our nearest known neighborhood.
    pub fn closest_bucket_index(&self) -> usize {
        self.buckets
            .iter()
            .position(|b| !b.is_empty())
            .unwrap_or(B - 1)
    }

    /// Up to `count` contacts sorted ascending by XOR distance to `key`.
    ///
    /// Scans the bucket the key routes to first, then walks outward through
    /// the remaining buckets (descending toward zero, then ascending) until
    /// enough candidates are gathered, and finally orders the gathered set
    /// by distance.
    pub fn closest_contacts(&self, key: &Fingerprint, count: usize, exclusive: bool) -> Vec<Contact> {
        let origin = key::bucket_index(&self.local, key).unwrap_or(0);

        let mut order: Vec<usize> = Vec::with_capacity(B);
        order.push(origin);
        order.extend((0..origin).rev());
        order.extend(origin + 1..B);

        let mut gathered: Vec<Contact> = Vec::new();
        for index in order {
            if gathered.len() >= count {
                break;
            }
            let want = count - gathered.len();
            gathered.extend(self.buckets[index].closest_to(key, want, exclusive));
        }

        gathered.sort_by(|a, b| key::distance(&a.id, key).cmp(&key::distance(&b.id, key)));
        gathered.truncate(count);
        gathered
    }
}
