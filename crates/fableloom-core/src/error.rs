//! Domain error types.
//!
//! Expected protocol branches (stale, duplicate, invalid) are *not* errors;
//! they are outcome variants returned by the commit protocol. `CoreError`
//! covers the conditions where no useful outcome exists.

use thiserror::Error;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No session exists for the given participant/public-id pair. Callers
    /// recover by starting a new session.
    #[error("session not found for participant {participant_id} key {public_id}")]
    SessionNotFound {
        /// The participant that owns the missing session.
        participant_id: i64,
        /// The public session key that was looked up.
        public_id: String,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The transactional store is unreachable or failed mid-transaction.
    /// Surfaced as-is; retry policy belongs to the caller, which must
    /// re-enter the idempotent protocol rather than bypass it.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
