//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::references::ReferenceIndex;
use crate::store::{ObjectStore, StoreError};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The desired state is malformed; permanent until the spec changes
    #[error("Validation failed: {0}")]
    Validation(String),
    /// A referenced resource or secret does not exist yet
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),
    /// Deletion is held back by resources that still reference this one
    #[error("Deletion blocked by {}", .0.join(", "))]
    DeletionBlocked(Vec<String>),
    #[error("Reconciliation cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Low-cardinality label used for metrics and logs
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::DependencyMissing(_) => "dependency",
            ReconcilerError::DeletionBlocked(_) => "blocked",
            ReconcilerError::Cancelled => "cancelled",
            ReconcilerError::Store(e) if e.is_conflict() => "conflict",
            ReconcilerError::Store(e) if e.is_not_found() => "not_found",
            ReconcilerError::Store(_) | ReconcilerError::ReconciliationFailed(_) => "transient",
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcilerError::Store(e) if e.is_conflict())
    }
}

/// Scheduling outcome of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Nothing to do until the next watch event
    Done,
    /// Periodic resync or not-ready polling
    RequeueAfter(Duration),
    /// Conflicts and freshly added finalizers
    RequeueNow,
}

impl Directive {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Done => "done",
            Directive::RequeueAfter(_) => "requeue-after",
            Directive::RequeueNow => "requeue-now",
        }
    }

    #[must_use]
    pub fn into_action(self, config: &ControllerConfig) -> Action {
        match self {
            Directive::Done => Action::await_change(),
            Directive::RequeueAfter(delay) => Action::requeue(delay),
            Directive::RequeueNow => Action::requeue(config.requeue_now_duration()),
        }
    }
}

/// Identity of a managed resource within its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: ExponentialBackoff::new(config.backoff_start_ms, config.backoff_max_ms),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context handed to every reconcile pass
pub struct Reconciler<S: ObjectStore> {
    pub store: Arc<S>,
    // Fed by watchers only; reconciles read it but never mutate it
    pub index: ReferenceIndex,
    pub config: Arc<ControllerConfig>,
    // Backoff state per resource (identified by kind/namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // Cancelled on shutdown; in-flight passes abort at their next await point
    pub cancel: CancellationToken,
}

impl<S: ObjectStore> std::fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: Arc<S>, index: ReferenceIndex, config: ControllerConfig) -> Self {
        Self {
            store,
            index,
            config: Arc::new(config),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Clear the error backoff of one resource after a successful pass.
    /// Returns whether the resource had been failing.
    pub fn reset_backoff(&self, backoff_key: &str) -> bool {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .remove(backoff_key)
                .is_some_and(|state| state.error_count > 0),
            Err(_) => false,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_backoff(&self, backoff_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(backoff_key.to_string())
                    .or_insert_with(|| BackoffState::new(&self.config));
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(_) => (self.config.backoff_start_duration(), 1),
        }
    }
}
