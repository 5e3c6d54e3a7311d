//! The per-lookup shortlist.
//!
//! A [`ContactList`] owns the candidate set of one iterative lookup: a
//! distance-ordered list of contacts plus two fingerprint sets tracking who
//! has been probed and who has answered. `active` is always a subset of
//! `contacted`, and the list never holds the same fingerprint twice.

use std::collections::HashSet;

use crate::contact::Contact;
use crate::key::{self, Fingerprint};

/// Lookup candidates sorted ascending by XOR distance to a target key.
///
/// Ties in distance keep first-seen order: sorting is stable and re-adding
/// an existing fingerprint is a no-op.
#[derive(Debug)]
pub struct ContactList {
    key: Fingerprint,
    contacts: Vec<Contact>,
    contacted: HashSet<Fingerprint>,
    active: HashSet<Fingerprint>,
}

impl ContactList {
    pub fn new(key: Fingerprint, initial: Vec<Contact>) -> Self {
        let mut list = Self {
            key,
            contacts: Vec::new(),
            contacted: HashSet::new(),
            active: HashSet::new(),
        };
        list.add(initial);
        list
    }

    /// The target key this lookup is converging on.
    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// The candidate with the smallest distance to the key.
    pub fn closest(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// The candidate with the greatest distance to the key.
    pub fn furthest(&self) -> Option<&Contact> {
        self.contacts.last()
    }

    /// Insert every contact whose fingerprint is not already present.
    ///
    /// Keeps the list sorted and returns only the newly inserted subset, so
    /// callers can tell whether a reply taught them anything.
    pub fn add(&mut self, contacts: Vec<Contact>) -> Vec<Contact> {
        let mut added = Vec::new();
        for contact in contacts {
            if self.contacts.iter().any(|c| c.id == contact.id) {
                continue;
            }
            self.contacts.push(contact.clone());
            added.push(contact);
        }
        if !added.is_empty() {
            let target = self.key;
            self.contacts
                .sort_by(|a, b| key::distance(&a.id, &target).cmp(&key::distance(&b.id, &target)));
        }
        added
    }

    /// Record that a probe was dispatched to this contact.
    pub fn mark_contacted(&mut self, contact: &Contact) {
        self.contacted.insert(contact.id);
    }

    /// Record a successful response; implies contacted.
    pub fn mark_responded(&mut self, contact: &Contact) {
        self.contacted.insert(contact.id);
        self.active.insert(contact.id);
    }

    /// Contacts that answered, in distance order.
    pub fn active(&self) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| self.active.contains(&c.id))
            .cloned()
            .collect()
    }

    /// Contacts not yet probed, in distance order.
    pub fn uncontacted(&self) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| !self.contacted.contains(&c.id))
            .cloned()
            .collect()
    }
}
