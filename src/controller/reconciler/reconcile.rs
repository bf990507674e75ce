//! # Reconciliation Logic
//!
//! One reconcile pass for any managed kind:
//!
//! 1. Fetch the resource; a missing object is success with nothing to do
//! 2. Deletion requested: hand over to [`finalize`](super::finalize)
//! 3. No finalizer yet: add it and requeue, before any child exists
//! 4. Open a [`StatusCollector`]
//! 5. Run the kind's convergence, which only writes into the collector
//! 6. Derive the phase from the reported sub-states
//! 7. Commit the collector in one status write
//! 8. Return the scheduling directive
//!
//! Validation failures still commit a `Failed` status. Dependency failures
//! commit `Pending` and poll. Conflicts requeue immediately without writing.
//! Anything else aborts the pass uncommitted and goes to the error policy.

use crate::controller::reconciler::finalize;
use crate::controller::reconciler::references::Referencing;
use crate::controller::reconciler::status::{
    default_message, derive_overall_phase, ready_condition, HasStatus, StatusCollector, SubState,
};
use crate::controller::reconciler::types::{Directive, Reconciler, ReconcilerError, ResourceKey};
use crate::crd::{ConditionStatus, Phase};
use crate::store::{kind_of, ObjectStore};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Condition type every kind maintains
pub const READY_CONDITION: &str = "Ready";

/// What a kind's convergence observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Convergence {
    /// One entry per sub-component (child, sync, API, ...)
    pub sub_states: Vec<SubState>,
    /// Periodic resync interval once converged
    pub resync: Option<Duration>,
}

impl Convergence {
    #[must_use]
    pub fn new(sub_states: Vec<SubState>) -> Self {
        Self {
            sub_states,
            resync: None,
        }
    }

    #[must_use]
    pub fn with_resync(mut self, resync: Duration) -> Self {
        self.resync = Some(resync);
        self
    }
}

/// Kind-specific behaviour driven by the generic pass
#[async_trait]
pub trait ManagedResource: HasStatus + Referencing {
    /// Finalizer guarding deletion of this kind
    const FINALIZER: &'static str;

    /// Whether deletion waits until nothing references the resource
    const BLOCKS_DELETION_WHILE_REFERENCED: bool = true;

    /// Converge children and cross-resource state, recording results in `status`
    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError>;

    /// Remove state that owner references do not cover. Best-effort.
    async fn cleanup<S: ObjectStore>(&self, _ctx: &Reconciler<S>) -> Result<(), ReconcilerError> {
        Ok(())
    }
}

#[must_use]
pub fn has_finalizer<K: HasStatus>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Persist the finalizer before anything else happens to the resource
async fn add_finalizer<K, S>(obj: &K, ctx: &Reconciler<S>) -> Result<Directive, ReconcilerError>
where
    K: ManagedResource,
    S: ObjectStore,
{
    let mut updated = obj.clone();
    updated
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(K::FINALIZER.to_string());
    match ctx.store.update(&updated).await {
        Ok(_) => {
            info!("🔒 Added finalizer {}", K::FINALIZER);
            Ok(Directive::RequeueNow)
        }
        Err(e) if e.is_conflict() => Ok(Directive::RequeueNow),
        Err(e) if e.is_not_found() => Ok(Directive::Done),
        Err(e) => Err(e.into()),
    }
}

/// One reconcile pass without deadline handling
///
/// # Errors
///
/// Transient store failures and anything a kind reports that is not a
/// validation, dependency or conflict outcome.
pub async fn reconcile_resource<K, S>(
    key: &ResourceKey,
    ctx: &Reconciler<S>,
) -> Result<Directive, ReconcilerError>
where
    K: ManagedResource,
    S: ObjectStore,
{
    let Some(obj) = ctx.store.get::<K>(&key.namespace, &key.name).await? else {
        debug!("{} {key} no longer exists", kind_of::<K>());
        return Ok(Directive::Done);
    };

    if obj.meta().deletion_timestamp.is_some() {
        return finalize::finalize(&obj, ctx).await;
    }

    if !has_finalizer(&obj, K::FINALIZER) {
        return add_finalizer(&obj, ctx).await;
    }

    let mut status = StatusCollector::for_object(&obj);
    let directive = match obj.converge(ctx, &mut status).await {
        Ok(convergence) => {
            let phase = derive_overall_phase(&convergence.sub_states);
            status.set_phase(phase);
            if status.message().is_none() {
                status.set_message(default_message(phase));
            }
            let (ready, reason) = ready_condition(phase);
            let message = status.message().unwrap_or_default().to_string();
            status.set_condition(READY_CONDITION, ready, reason, message);
            match (phase, convergence.resync) {
                (Phase::Ready | Phase::Failed, Some(resync)) => Directive::RequeueAfter(resync),
                (Phase::Ready | Phase::Failed, None) => Directive::Done,
                _ => Directive::RequeueAfter(ctx.config.not_ready_requeue_duration()),
            }
        }
        Err(ReconcilerError::Validation(message)) => {
            warn!("❌ Validation failed for {} {key}: {message}", kind_of::<K>());
            status.set_phase(Phase::Failed);
            status.set_message(message.clone());
            status.set_condition(
                READY_CONDITION,
                ConditionStatus::False,
                "ValidationFailed",
                message,
            );
            // Permanent until the spec changes; the next edit triggers a new pass
            Directive::Done
        }
        Err(ReconcilerError::DependencyMissing(message)) => {
            info!("⏳ {} {key} waiting on dependency: {message}", kind_of::<K>());
            status.set_phase(Phase::Pending);
            status.set_message(message.clone());
            status.set_condition(
                READY_CONDITION,
                ConditionStatus::False,
                "DependencyMissing",
                message,
            );
            Directive::RequeueAfter(ctx.config.dependency_requeue_duration())
        }
        Err(e) if e.is_conflict() => {
            debug!("Conflict while converging {} {key}: {e}", kind_of::<K>());
            return Ok(Directive::RequeueNow);
        }
        Err(e) => return Err(e),
    };

    match status.commit(&obj, ctx.store.as_ref()).await {
        Ok(_) => Ok(directive),
        Err(e) if e.is_conflict() => {
            debug!("Status conflict for {} {key}, requeueing", kind_of::<K>());
            Ok(Directive::RequeueNow)
        }
        Err(ReconcilerError::Store(e)) if e.is_not_found() => Ok(Directive::Done),
        Err(e) => Err(e),
    }
}

/// One reconcile pass bounded by the shutdown token and the pass deadline
///
/// Expiry drops the pass at its current await point; the status commit is
/// the last write of a pass, so an aborted pass never leaves a partial status.
///
/// # Errors
///
/// [`ReconcilerError::Cancelled`] on shutdown or deadline, plus everything
/// [`reconcile_resource`] returns.
pub async fn run_pass<K, S>(key: &ResourceKey, ctx: &Reconciler<S>) -> Result<Directive, ReconcilerError>
where
    K: ManagedResource,
    S: ObjectStore,
{
    let span = info_span!(
        "reconcile",
        resource.kind = %kind_of::<K>(),
        resource.namespace = %key.namespace,
        resource.name = %key.name,
    );
    let deadline = ctx.config.reconcile_timeout_duration();
    async {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(ReconcilerError::Cancelled),
            result = tokio::time::timeout(deadline, reconcile_resource::<K, S>(key, ctx)) => {
                result.unwrap_or(Err(ReconcilerError::Cancelled))
            }
        }
    }
    .instrument(span)
    .await
}
