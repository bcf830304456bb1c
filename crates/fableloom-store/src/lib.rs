//! Fableloom — `PostgreSQL` persistence.
//!
//! Implements the session and delivery store traits over sqlx. The protocol
//! and ledger logic lives in `fableloom-session` and `fableloom-delivery`;
//! this crate only realizes their transaction seams: row locks via
//! `SELECT ... FOR UPDATE`, idempotent claims via unique constraints with
//! `ON CONFLICT DO NOTHING`.

pub mod delivery_store;
pub mod row;
pub mod session_store;

pub use delivery_store::PgDeliveryStore;
pub use session_store::PgTurnStore;

use fableloom_core::error::CoreError;

/// Maps an infrastructure failure into the domain error space.
pub(crate) fn store_err(err: sqlx::Error) -> CoreError {
    CoreError::StoreUnavailable(err.to_string())
}
