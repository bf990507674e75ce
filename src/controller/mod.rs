//! # Controller
//!
//! Core controller modules for the MCP operator.
//!
//! - `backoff`: exponential backoff for failed reconciles
//! - `kinds`: per-kind convergence for every managed CRD
//! - `reconciler`: the generic reconciliation engine

pub mod backoff;
pub mod kinds;
pub mod reconciler;
