//! Fingerprint arithmetic: XOR distance, bucket indexing, random keys, and
//! hex forms.
//!
//! Everything here is pure. Distances are the byte-wise XOR of two
//! fingerprints, compared lexicographically as big-endian 160-bit integers;
//! bucket indices count from the least significant bit, so index 0 is the
//! closest bucket and index `B - 1` the furthest.

use rand::Rng;
use sha1::{Digest, Sha1};

use crate::error::DhtError;
use crate::{B, KEY_LEN};

/// A 160-bit identifier.
///
/// The canonical form is 20 raw bytes; the wire form is the lowercase
/// 40-character hex string. Fingerprints identify both nodes and stored
/// values, which is what lets lookups navigate toward either.
pub type Fingerprint = [u8; KEY_LEN];

/// Compute the 160-bit content digest used to derive value keys.
///
/// A `STORE` is only accepted when its key equals `hash160` of the blob, so
/// values are content-addressed end to end.
pub fn hash160(data: &[u8]) -> Fingerprint {
    Sha1::digest(data).into()
}

/// XOR distance between two fingerprints.
///
/// # Properties
/// - `distance(a, a) == [0; 20]`
/// - `distance(a, b) == distance(b, a)`
/// - `distance(a, c) == xor(distance(a, b), distance(b, c))`
///
/// The result is itself a big-endian 160-bit integer; `[u8; 20]`'s derived
/// `Ord` is exactly the lexicographic order the protocol calls for.
pub fn distance(a: &Fingerprint, b: &Fingerprint) -> Fingerprint {
    let mut out = [0u8; KEY_LEN];
    for i in 0..KEY_LEN {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Bucket index of `key` relative to `local`.
///
/// Returns the position, counting from the least significant bit, of the
/// most significant bit where the two differ: `Some(0)` for adjacent
/// identifiers up to `Some(B - 1)` for the furthest, and `None` when the
/// fingerprints are equal (the local identity is never bucketed).
pub fn bucket_index(local: &Fingerprint, key: &Fingerprint) -> Option<usize> {
    let dist = distance(local, key);
    for (byte_idx, byte) in dist.iter().enumerate() {
        if *byte != 0 {
            let high_bit = 7 - byte.leading_zeros() as usize;
            return Some((KEY_LEN - 1 - byte_idx) * 8 + high_bit);
        }
    }
    None
}

/// A uniformly random fingerprint.
pub fn rand_fingerprint() -> Fingerprint {
    let mut out = [0u8; KEY_LEN];
    rand::thread_rng().fill(&mut out[..]);
    out
}

/// A random fingerprint whose distance to `local` falls in bucket `index`.
///
/// Starts from `local`, flips bit `index`, and randomizes every bit below
/// it, so the distance's highest set bit lands exactly at `index`. Used by
/// bucket refresh to aim a lookup into an arbitrary bucket's range.
pub fn rand_in_bucket_range(local: &Fingerprint, index: usize) -> Fingerprint {
    debug_assert!(index < B, "bucket index out of range");
    let mut out = *local;
    let byte_idx = KEY_LEN - 1 - index / 8;
    let bit = index % 8;

    out[byte_idx] ^= 1 << bit;

    let mut rng = rand::thread_rng();
    let low_mask: u8 = (1u8 << bit).wrapping_sub(1);
    out[byte_idx] = (out[byte_idx] & !low_mask) | (rng.gen::<u8>() & low_mask);
    for slot in out.iter_mut().skip(byte_idx + 1) {
        *slot = rng.gen();
    }
    out
}

/// Parse a 40-character hex string into a fingerprint.
///
/// Anything that is not exactly 160 bits of hex fails with
/// [`DhtError::InvalidKey`]; this is the validation the request handlers
/// apply to every key that arrives from the wire.
pub fn from_hex(hex_key: &str) -> Result<Fingerprint, DhtError> {
    if hex_key.len() != KEY_LEN * 2 {
        return Err(DhtError::InvalidKey);
    }
    let bytes = hex::decode(hex_key).map_err(|_| DhtError::InvalidKey)?;
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Lowercase hex form of a fingerprint.
pub fn to_hex(id: &Fingerprint) -> String {
    hex::encode(id)
}

/// Short hex prefix for log fields.
pub(crate) fn short_hex(id: &Fingerprint) -> String {
    hex::encode(&id[..4])
}
