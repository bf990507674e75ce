//! # Status Management
//!
//! Batched status writes and phase derivation.

mod collector;
mod phase;

pub use collector::{HasStatus, StatusCollector};
pub use phase::{default_message, derive_overall_phase, ready_condition, SubState};
