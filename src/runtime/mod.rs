//! # Runtime
//!
//! Operator runtime: initialization, index feeds, watch loops and error policy.

pub mod error_policy;
pub mod index_feed;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loops;
