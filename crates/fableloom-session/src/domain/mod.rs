//! Domain model for the Session & Turn Commit context.

pub mod event;
pub mod outcome;
pub mod payload;
pub mod session;
