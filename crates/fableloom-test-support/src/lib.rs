//! Shared test utilities for the Fableloom workspace: deterministic clocks,
//! in-memory store implementations, and a fixture content catalog.
//!
//! The in-memory stores run the real protocol drivers, so protocol behavior
//! can be tested without a database; only the transaction mechanics are
//! simulated.

pub mod clock;
pub mod delivery_store;
pub mod provider;
pub mod session_store;

pub use clock::{FixedClock, ManualClock};
pub use delivery_store::InMemoryDeliveryStore;
pub use provider::FixtureContentProvider;
pub use session_store::InMemoryTurnStore;
