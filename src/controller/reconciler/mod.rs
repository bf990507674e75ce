//! # Reconciler
//!
//! The reconciliation engine shared by every managed kind.
//!
//! - `hash`: deterministic config hashing with secret content folded in
//! - `references`: reverse reference index fed by watchers
//! - `status`: batched status writes and phase derivation
//! - `children`: create-or-update of owned children with override merging
//! - `finalize`: deletion protocol with referential-integrity veto
//! - `reconcile`: the per-pass orchestration
//! - `trigger`: reactive re-triggering and annotation fan-out
//! - `validation`: duration, name and URL checks

pub mod children;
pub mod finalize;
pub mod hash;
pub mod reconcile;
pub mod references;
pub mod status;
pub mod trigger;
pub mod types;
pub mod validation;

// Re-export public API
pub use reconcile::{reconcile_resource, run_pass, Convergence, ManagedResource};
pub use references::{apply_event, ReferenceIndex, Referencing, ResourceKind, ResourceRef};
pub use status::{derive_overall_phase, HasStatus, StatusCollector, SubState};
pub use types::{BackoffState, Directive, Reconciler, ReconcilerError, ResourceKey};
