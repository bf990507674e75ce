//! # Drift Detection
//!
//! Compares only what the controller owns. The desired manifest is projected
//! onto its owned fields (labels, annotations, owner references and the body,
//! minus status and the paths left to other writers), and the projection must
//! be contained in the live object. Fields the API server defaults or other
//! controllers add are therefore never treated as drift.

use crate::controller::reconciler::children::merge::list_merge_key;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Desired fields the controller owns
#[must_use]
pub fn owned_projection(value: &Value, unowned: &[&str]) -> Value {
    let mut projection = value.clone();
    if let Some(map) = projection.as_object_mut() {
        map.remove("status");
        if let Some(Value::Object(meta)) = map.get_mut("metadata") {
            let kept: Map<String, Value> = ["labels", "annotations", "ownerReferences"]
                .iter()
                .filter_map(|k| meta.get(*k).map(|v| ((*k).to_string(), v.clone())))
                .collect();
            *meta = kept;
        }
    }
    for pointer in unowned {
        remove_pointer(&mut projection, pointer);
    }
    projection
}

fn remove_pointer(value: &mut Value, pointer: &str) {
    let Some((parent, leaf)) = pointer.rsplit_once('/') else {
        return;
    };
    if let Some(Value::Object(map)) = value.pointer_mut(parent) {
        map.remove(leaf);
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Whether `desired` is contained in `existing`. `field` names the member
/// `desired` lives under so keyed lists can be matched element-wise.
#[must_use]
pub fn is_subset(desired: &Value, existing: &Value, field: Option<&str>) -> bool {
    subset_at(desired, existing, field, None)
}

fn subset_at(desired: &Value, existing: &Value, field: Option<&str>, parent: Option<&str>) -> bool {
    if desired.is_null() {
        return true;
    }
    if existing.is_null() {
        // An empty desired value is the same as an absent one
        return is_empty(desired);
    }
    match (desired, existing) {
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            subset_at(value, have.get(key).unwrap_or(&Value::Null), Some(key), field)
        }),
        (Value::Array(want), Value::Array(have)) => {
            match field.and_then(|f| list_merge_key(f, parent)) {
                Some(merge_key) => keyed_subset(want, have, merge_key, field),
                None => {
                    want.len() == have.len()
                        && want.iter().zip(have).all(|(w, h)| subset_at(w, h, None, None))
                }
            }
        }
        (want, have) => want == have,
    }
}

fn keyed_subset(want: &[Value], have: &[Value], merge_key: &str, list: Option<&str>) -> bool {
    let keys = |items: &[Value]| -> BTreeSet<String> {
        items
            .iter()
            .filter_map(|item| item.get(merge_key))
            .map(Value::to_string)
            .collect()
    };
    if keys(want) != keys(have) {
        return false;
    }
    want.iter().all(|w| {
        let key = w.get(merge_key);
        have.iter()
            .find(|h| h.get(merge_key) == key)
            .is_some_and(|h| subset_at(w, h, list, None))
    })
}

/// Whether the live object differs from the desired one in an owned field
#[must_use]
pub fn has_drift(desired: &Value, existing: &Value, unowned: &[&str]) -> bool {
    let want = owned_projection(desired, unowned);
    let have = owned_projection(existing, unowned);
    !is_subset(&want, &have, None)
}
