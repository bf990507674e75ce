//! # Override Merge
//!
//! Merges a user-supplied partial manifest over a generated one.
//!
//! Objects merge recursively. Lists of named things (containers, volumes, env,
//! ports, mounts) merge element-wise by their key, so a generated element the
//! override never mentions survives untouched. Every other list is replaced.
//! A `null` in the override means "inherit": it never clears the generated
//! value and never introduces an explicit empty collection.

use crate::controller::reconciler::types::ReconcilerError;
use serde_json::Value;

/// Partial manifest applied at `pointer` inside a generated child
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    pub pointer: &'static str,
    pub patch: &'a Value,
}

/// Field names whose elements are containers
const CONTAINER_LISTS: [&str; 3] = ["containers", "initContainers", "ephemeralContainers"];

/// Key identifying elements of a list-valued field
///
/// `parent` is the field the object holding the list lives under. It tells a
/// container's `ports` (keyed by `containerPort`) from a Service's `ports`
/// (keyed by `port`).
#[must_use]
pub fn list_merge_key(field: &str, parent: Option<&str>) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "volumes" | "env"
        | "imagePullSecrets" => Some("name"),
        "ports" if parent.is_some_and(|p| CONTAINER_LISTS.contains(&p)) => Some("containerPort"),
        "ports" => Some("port"),
        "volumeMounts" => Some("mountPath"),
        _ => None,
    }
}

/// Copy of `value` with null object members removed at every level
#[must_use]
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        scalar => scalar.clone(),
    }
}

/// Merge `patch` into `base`. `field` is the name `base` lives under.
pub fn merge_value(base: &mut Value, patch: &Value, field: Option<&str>) {
    merge_at(base, patch, field, None);
}

fn merge_at(base: &mut Value, patch: &Value, field: Option<&str>, parent: Option<&str>) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => merge_at(existing, patch_value, Some(key), field),
                    None => {
                        base_map.insert(key.clone(), strip_nulls(patch_value));
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(patch_items)) => {
            let list = field.unwrap_or_default();
            match field.and_then(|f| list_merge_key(f, parent)) {
                Some(merge_key) => merge_keyed_list(base_items, patch_items, merge_key, list),
                None => *base_items = patch_items.iter().map(strip_nulls).collect(),
            }
        }
        (base, patch) => *base = strip_nulls(patch),
    }
}

/// Elements are merged as if they lived under `list`, so their own lists
/// resolve keys against it
fn merge_keyed_list(base_items: &mut Vec<Value>, patch_items: &[Value], merge_key: &str, list: &str) {
    for patch_item in patch_items {
        let key = patch_item.get(merge_key).filter(|k| !k.is_null());
        let target = key.and_then(|key| {
            base_items
                .iter_mut()
                .find(|item| item.get(merge_key) == Some(key))
        });
        match target {
            Some(existing) => merge_at(existing, patch_item, Some(list), None),
            None => base_items.push(strip_nulls(patch_item)),
        }
    }
}

/// Apply `overlay` to a generated manifest in place
///
/// # Errors
///
/// [`ReconcilerError::Validation`] when the override is not an object.
pub fn apply_overlay(desired: &mut Value, overlay: Overlay<'_>) -> Result<(), ReconcilerError> {
    if overlay.patch.is_null() {
        return Ok(());
    }
    if !overlay.patch.is_object() {
        return Err(ReconcilerError::Validation(format!(
            "override for {} must be an object",
            overlay.pointer
        )));
    }
    let target = desired.pointer_mut(overlay.pointer).ok_or_else(|| {
        anyhow::anyhow!("generated manifest has no {} to override", overlay.pointer)
    })?;
    merge_value(target, overlay.patch, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generated_template() -> Value {
        json!({
            "metadata": {"labels": {"app": "fetch"}},
            "spec": {
                "containers": [{
                    "name": "mcp",
                    "image": "runner:1",
                    "env": [{"name": "MCP_TRANSPORT", "value": "sse"}],
                    "ports": [{"containerPort": 8080, "name": "http"}]
                }]
            }
        })
    }

    #[test]
    fn test_auxiliary_override_keeps_generated_container() {
        let mut template = generated_template();
        let patch = json!({"spec": {"nodeSelector": {"disktype": "ssd"}}});
        merge_value(&mut template, &patch, None);
        assert_eq!(template["spec"]["containers"][0]["name"], "mcp");
        assert_eq!(template["spec"]["containers"][0]["image"], "runner:1");
        assert_eq!(template["spec"]["nodeSelector"]["disktype"], "ssd");
    }

    #[test]
    fn test_containers_merge_by_name() {
        let mut template = generated_template();
        let patch = json!({"spec": {"containers": [
            {"name": "mcp", "resources": {"limits": {"memory": "256Mi"}}},
            {"name": "sidecar", "image": "busybox"}
        ]}});
        merge_value(&mut template, &patch, None);
        let containers = template["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["image"], "runner:1");
        assert_eq!(containers[0]["resources"]["limits"]["memory"], "256Mi");
        assert_eq!(containers[1]["name"], "sidecar");
    }

    #[test]
    fn test_nested_env_merges_by_name() {
        let mut template = generated_template();
        let patch = json!({"spec": {"containers": [
            {"name": "mcp", "env": [
                {"name": "MCP_TRANSPORT", "value": "stdio"},
                {"name": "EXTRA", "value": "1"}
            ]}
        ]}});
        merge_value(&mut template, &patch, None);
        let env = template["spec"]["containers"][0]["env"].as_array().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0]["value"], "stdio");
    }

    #[test]
    fn test_null_means_inherit() {
        let mut template = generated_template();
        let patch = json!({"spec": {"containers": null, "volumes": null, "tolerations": [{"key": "a", "operator": null}]}});
        merge_value(&mut template, &patch, None);
        assert_eq!(template["spec"]["containers"][0]["name"], "mcp");
        assert!(template["spec"].get("volumes").is_none());
        assert_eq!(template["spec"]["tolerations"], json!([{"key": "a"}]));
    }

    #[test]
    fn test_unkeyed_lists_are_replaced() {
        let mut base = json!({"args": ["a", "b"]});
        merge_value(&mut base, &json!({"args": ["c"]}), None);
        assert_eq!(base["args"], json!(["c"]));
    }

    #[test]
    fn test_overlay_rejects_non_object() {
        let mut desired = json!({"spec": {"template": {}}});
        let patch = json!(["not", "an", "object"]);
        let err = apply_overlay(
            &mut desired,
            Overlay {
                pointer: "/spec/template",
                patch: &patch,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ReconcilerError::Validation(_)));
    }

    #[test]
    fn test_ports_key_depends_on_parent() {
        assert_eq!(list_merge_key("ports", Some("containers")), Some("containerPort"));
        assert_eq!(list_merge_key("ports", Some("initContainers")), Some("containerPort"));
        assert_eq!(list_merge_key("ports", Some("spec")), Some("port"));
        assert_eq!(list_merge_key("ports", None), Some("port"));
    }

    #[test]
    fn test_container_port_override_merges_into_generated_port() {
        let mut template = generated_template();
        let patch = json!({"spec": {"containers": [
            {"name": "mcp", "ports": [{"containerPort": 8080, "protocol": "TCP"}]}
        ]}});
        merge_value(&mut template, &patch, None);
        let ports = template["spec"]["containers"][0]["ports"].as_array().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0]["name"], "http");
        assert_eq!(ports[0]["protocol"], "TCP");
    }

    #[test]
    fn test_service_ports_merge_by_port() {
        let mut service = json!({"spec": {"ports": [
            {"name": "http", "port": 8080},
            {"name": "metrics", "port": 9090}
        ]}});
        let patch = json!({"spec": {"ports": [{"port": 9090, "appProtocol": "http"}]}});
        merge_value(&mut service, &patch, None);
        let ports = service["spec"]["ports"].as_array().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0]["name"], "http");
        assert!(ports[0].get("appProtocol").is_none());
        assert_eq!(ports[1]["appProtocol"], "http");
    }
}
