//! MCP Operator Library
//!
//! Reconciliation engine for the MCP custom resources: config hashing, a
//! reverse reference index, batched status writes, child convergence with
//! user overrides, a finalization protocol and reactive re-triggering.
//!
//! The engine runs against the [`store::ObjectStore`] seam, so every kind can
//! be exercised in tests with [`store::MemoryStore`].

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod store;
