//! Error taxonomy of the protocol core.

use thiserror::Error;

/// Failures surfaced by handlers, lookups, and maintenance.
///
/// Per-RPC transport errors never fail a lookup wholesale; a lookup always
/// resolves with whatever active contacts it found. The variants here are
/// the ones callers can actually observe.
#[derive(Debug, Error)]
pub enum DhtError {
    /// A key received from the wire was not a 160-bit hex identifier.
    #[error("key is not a 160-bit hex identifier")]
    InvalidKey,

    /// A STORE key did not equal `hash160` of the offered blob.
    #[error("key does not match hash160 of the blob")]
    KeyHashMismatch,

    /// An outbound RPC failed. Timeouts are owned by the transport and are
    /// indistinguishable from any other failure here.
    #[error("transport error: {0}")]
    Transport(anyhow::Error),

    /// `iterative_store` got zero confirmations.
    #[error("no contact confirmed the store")]
    NoStorageTargets,

    /// The join lookup reached nobody.
    #[error("join lookup failed")]
    JoinFailed,

    /// The storage adapter failed.
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}
