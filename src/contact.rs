//! Contacts: an opaque transport address bound to a fingerprint.

use serde::{Deserialize, Serialize};

use crate::key::Fingerprint;

/// Another participant in the DHT.
///
/// The address is opaque to the core. Transports put whatever they need to
/// dial the peer into it (a socket address, a serialized endpoint record, an
/// onion URL); the core only carries it around and hands it back on
/// outbound RPCs. A contact's fingerprint is stable for its lifetime, but
/// the address may be updated in place when the peer is re-observed from a
/// new location.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// The node's 160-bit identity.
    pub id: Fingerprint,
    /// Opaque transport address.
    pub addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    #[test]
    fn contact_round_trips_through_serde() {
        let contact = Contact {
            id: key::rand_fingerprint(),
            addr: "tcp://198.51.100.7:4000".into(),
        };
        let encoded = serde_json::to_string(&contact).unwrap();
        let decoded: Contact = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, contact);
    }
}
