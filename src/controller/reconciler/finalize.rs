//! # Finalization
//!
//! Deletion protocol for resources whose `deletionTimestamp` is set.
//!
//! While other resources still reference the one being deleted, the finalizer
//! stays, the status names the blockers and the pass returns
//! [`ReconcilerError::DeletionBlocked`] so the error policy keeps retrying.
//! Once nothing references it, kind-specific cleanup runs (failures are
//! logged, never fatal) and the finalizer is removed, letting the store finish
//! the deletion. Every step tolerates being repeated after a crash.
//!
//! References are read from the index and confirmed against the store, so a
//! cold index cannot release a resource that is still in use. The reference
//! check and the finalizer removal are two separate writes; a reference
//! created in between is not seen by this pass.

use crate::controller::reconciler::reconcile::{has_finalizer, ManagedResource, READY_CONDITION};
use crate::controller::reconciler::references::{Referencing, ResourceRef};
use crate::controller::reconciler::status::StatusCollector;
use crate::controller::reconciler::types::{Directive, Reconciler, ReconcilerError};
use crate::crd::{
    ConditionStatus, McpExternalAuthConfig, McpRegistry, McpRemoteProxy, McpServer, Phase,
};
use crate::store::{kind_of, Object, ObjectStore};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Condition reporting why deletion is held back
pub const DELETION_BLOCKED_CONDITION: &str = "DeletionBlocked";

/// Every `R` in the target's namespace whose spec points at `target`
async fn scan_store<R, S>(
    store: &S,
    target: &ResourceRef,
    found: &mut BTreeSet<ResourceRef>,
) -> Result<(), ReconcilerError>
where
    R: Referencing + Object,
    S: ObjectStore,
{
    for candidate in store.list::<R>(&target.namespace).await? {
        if candidate.references().contains(target) {
            found.extend(ResourceRef::of(&candidate));
        }
    }
    Ok(())
}

/// Resources that still reference `obj`, as `Kind/name`
///
/// Union of the index and a direct store scan. The index may still be
/// relisting or lag a fresh create.
async fn blockers<K, S>(obj: &K, ctx: &Reconciler<S>) -> Result<Vec<String>, ReconcilerError>
where
    K: ManagedResource,
    S: ObjectStore,
{
    if !K::BLOCKS_DELETION_WHILE_REFERENCED {
        return Ok(Vec::new());
    }
    let Some(target) = ResourceRef::of(obj) else {
        return Ok(Vec::new());
    };
    let mut found: BTreeSet<ResourceRef> = ctx
        .index
        .find_referencing(target.kind, &target.namespace, &target.name)
        .into_iter()
        .collect();
    let store = ctx.store.as_ref();
    scan_store::<McpServer, S>(store, &target, &mut found).await?;
    scan_store::<McpRemoteProxy, S>(store, &target, &mut found).await?;
    scan_store::<McpExternalAuthConfig, S>(store, &target, &mut found).await?;
    scan_store::<McpRegistry, S>(store, &target, &mut found).await?;
    Ok(found.iter().map(ToString::to_string).collect())
}

/// Drive one deletion step for `obj`
///
/// # Errors
///
/// [`ReconcilerError::DeletionBlocked`] while references remain, and store
/// failures other than conflicts.
pub async fn finalize<K, S>(obj: &K, ctx: &Reconciler<S>) -> Result<Directive, ReconcilerError>
where
    K: ManagedResource,
    S: ObjectStore,
{
    if !has_finalizer(obj, K::FINALIZER) {
        // Someone else holds the object; nothing of ours to release
        return Ok(Directive::Done);
    }
    let name = obj.meta().name.clone().unwrap_or_default();
    let kind = kind_of::<K>();

    let blocked_by = blockers(obj, ctx).await?;
    let mut status = StatusCollector::for_object(obj);
    status.set_phase(Phase::Terminating);

    if !blocked_by.is_empty() {
        let message = format!(
            "Deletion blocked: still referenced by {}",
            blocked_by.join(", ")
        );
        warn!("🚫 {kind} {name}: {message}");
        status.set_message(message.clone());
        status.set_condition(
            DELETION_BLOCKED_CONDITION,
            ConditionStatus::True,
            "StillReferenced",
            message.clone(),
        );
        status.set_condition(
            READY_CONDITION,
            ConditionStatus::False,
            "Terminating",
            message,
        );
        match status.commit(obj, ctx.store.as_ref()).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => return Ok(Directive::RequeueNow),
            Err(ReconcilerError::Store(e)) if e.is_not_found() => return Ok(Directive::Done),
            Err(e) => return Err(e),
        }
        return Err(ReconcilerError::DeletionBlocked(blocked_by));
    }

    status.set_message("Deletion in progress");
    status.set_condition(
        DELETION_BLOCKED_CONDITION,
        ConditionStatus::False,
        "NoReferences",
        "",
    );
    status.set_condition(
        READY_CONDITION,
        ConditionStatus::False,
        "Terminating",
        "Deletion in progress",
    );
    let current = match status.commit(obj, ctx.store.as_ref()).await {
        Ok(Some(written)) => written,
        Ok(None) => obj.clone(),
        Err(e) if e.is_conflict() => return Ok(Directive::RequeueNow),
        Err(ReconcilerError::Store(e)) if e.is_not_found() => return Ok(Directive::Done),
        Err(e) => return Err(e),
    };

    if let Err(e) = obj.cleanup(ctx).await {
        warn!("⚠️  Cleanup for {kind} {name} failed, removing finalizer anyway: {e}");
    }

    let mut released = current;
    if let Some(finalizers) = released.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != K::FINALIZER);
    }
    match ctx.store.update(&released).await {
        Ok(_) => {
            info!("🗑️  Removed finalizer from {kind} {name}");
            Ok(Directive::Done)
        }
        Err(e) if e.is_conflict() => Ok(Directive::RequeueNow),
        Err(e) if e.is_not_found() => Ok(Directive::Done),
        Err(e) => Err(e.into()),
    }
}
