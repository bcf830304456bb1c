//! Fableloom — Idempotent Delivery bounded context.
//!
//! Decides, per logical content unit, whether to (re-)send it to the end
//! user: at-most-once visible delivery with bounded retry/backoff. The
//! ledger never sends anything itself; transports call [`store::DeliveryStore::acquire`]
//! before sending and report back with `mark_shown`/`mark_failed`.

pub mod hash;
pub mod ledger;
pub mod record;
pub mod store;

pub use hash::{content_hash, normalize_content};
pub use ledger::{run_acquire, run_mark_failed, run_mark_shown};
pub use record::{
    DeliveryRecord, DeliveryState, KIND_STEP_CONTENT, KIND_STEP_LOCKED, backoff_delay,
    pending_timeout,
};
pub use store::{AcquireDecision, AcquireResult, DeliveryStore, DeliveryTxn};
