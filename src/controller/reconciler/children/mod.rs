//! # Child Convergence
//!
//! Create-or-update of owned child objects.
//!
//! A child is generated deterministically from its owner's spec, optionally
//! overlaid with a user override ([`merge`]), and compared against the live
//! object on owned fields only ([`drift`]). Fields listed in
//! [`Child::UNOWNED`] belong to other writers (autoscalers, the API server) and
//! are carried over from the live object on every update.

pub mod drift;
pub mod merge;

pub use merge::Overlay;

use crate::controller::reconciler::types::ReconcilerError;
use crate::observability::metrics;
use crate::store::{kind_of, object_key, Object, ObjectStore};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Kinds the engine creates and owns
pub trait Child: Object {
    /// JSON pointers of fields left to other writers
    const UNOWNED: &'static [&'static str] = &[];
}

impl Child for Deployment {
    const UNOWNED: &'static [&'static str] = &["/spec/replicas"];
}

impl Child for Service {
    const UNOWNED: &'static [&'static str] = &["/spec/clusterIP", "/spec/clusterIPs"];
}

impl Child for ConfigMap {}

impl Child for ServiceAccount {}

impl Child for Role {}

impl Child for RoleBinding {}

/// What converging a child requires
#[derive(Debug, Clone, PartialEq)]
pub enum ChildAction<C> {
    Create(C),
    Update(C),
    NoOp,
}

impl<C> ChildAction<C> {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildAction::Create(_) => "create",
            ChildAction::Update(_) => "update",
            ChildAction::NoOp => "noop",
        }
    }
}

fn to_value<C: Object>(obj: &C) -> Result<Value, ReconcilerError> {
    serde_json::to_value(obj)
        .map_err(|e| anyhow::anyhow!("serialize {}: {e}", kind_of::<C>()).into())
}

/// Desired manifest for `desired` with `overlay` merged in
///
/// # Errors
///
/// [`ReconcilerError::Validation`] when the override is malformed or the
/// merged manifest no longer parses as `C`.
pub fn render_desired<C: Child>(
    desired: &C,
    overlay: Option<Overlay<'_>>,
) -> Result<C, ReconcilerError> {
    let Some(overlay) = overlay else {
        return Ok(desired.clone());
    };
    let mut value = to_value(desired)?;
    merge::apply_overlay(&mut value, overlay)?;
    serde_json::from_value(value).map_err(|e| {
        ReconcilerError::Validation(format!(
            "override at {} is not a valid {}: {e}",
            overlay.pointer,
            kind_of::<C>()
        ))
    })
}

/// Live object rewritten to the desired state, keeping server-owned metadata
/// and every unowned field
fn prepare_update(desired: &Value, existing: &Value, unowned: &[&str]) -> Value {
    let mut next = desired.clone();
    let mut meta: Map<String, Value> = existing
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for field in ["labels", "annotations"] {
        let mut merged = meta
            .get(field)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(Value::Object(wanted)) = desired.pointer(&format!("/metadata/{field}")) {
            merged.extend(wanted.clone());
        }
        if merged.is_empty() {
            meta.remove(field);
        } else {
            meta.insert(field.to_string(), Value::Object(merged));
        }
    }
    if let Some(owners) = desired.pointer("/metadata/ownerReferences") {
        meta.insert("ownerReferences".to_string(), owners.clone());
    }
    if let Some(map) = next.as_object_mut() {
        map.insert("metadata".to_string(), Value::Object(meta));
        map.remove("status");
    }
    for pointer in unowned {
        let Some((parent, leaf)) = pointer.rsplit_once('/') else {
            continue;
        };
        let live = existing.pointer(pointer).cloned();
        if let Some(Value::Object(target)) = next.pointer_mut(parent) {
            match live {
                Some(v) => target.insert(leaf.to_string(), v),
                None => target.remove(leaf),
            };
        }
    }
    next
}

/// Decide between create, update and no-op for one child
///
/// # Errors
///
/// Validation errors from the override and serialization failures.
pub fn plan<C: Child>(
    desired: &C,
    overlay: Option<Overlay<'_>>,
    existing: Option<&C>,
) -> Result<ChildAction<C>, ReconcilerError> {
    let desired = render_desired(desired, overlay)?;
    let Some(existing) = existing else {
        return Ok(ChildAction::Create(desired));
    };
    let desired_value = to_value(&desired)?;
    let existing_value = to_value(existing)?;
    if !drift::has_drift(&desired_value, &existing_value, C::UNOWNED) {
        return Ok(ChildAction::NoOp);
    }
    let next = prepare_update(&desired_value, &existing_value, C::UNOWNED);
    let next = serde_json::from_value(next)
        .map_err(|e| anyhow::anyhow!("rebuild {} for update: {e}", kind_of::<C>()))?;
    Ok(ChildAction::Update(next))
}

/// Bring one child in line with `desired` and return the live object
///
/// # Errors
///
/// Store errors (a concurrent create surfaces as a conflict) and everything
/// [`plan`] returns.
pub async fn converge_child<C, S>(
    store: &S,
    desired: &C,
    overlay: Option<Overlay<'_>>,
) -> Result<C, ReconcilerError>
where
    C: Child,
    S: ObjectStore,
{
    let (namespace, name) = object_key(desired)?;
    let existing = store.get::<C>(&namespace, &name).await?;
    let action = plan(desired, overlay, existing.as_ref())?;
    let child_kind = kind_of::<C>();
    let action_label = action.as_str();
    let live = match action {
        ChildAction::Create(obj) => {
            info!(
                child.kind = %child_kind,
                child.name = %name,
                "✨ Creating {child_kind} {namespace}/{name}"
            );
            store.create(&obj).await?
        }
        ChildAction::Update(obj) => {
            info!(
                child.kind = %child_kind,
                child.name = %name,
                "🔄 Updating {child_kind} {namespace}/{name} (owned fields drifted)"
            );
            store.update(&obj).await?
        }
        ChildAction::NoOp => {
            debug!("{child_kind} {namespace}/{name} is up to date");
            return existing
                .ok_or_else(|| anyhow::anyhow!("{child_kind} {name} vanished").into());
        }
    };
    metrics::increment_child_operations(&child_kind, action_label);
    Ok(live)
}
