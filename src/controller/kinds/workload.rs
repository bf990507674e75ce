//! # Workload Manifests
//!
//! Deterministic builders for the Deployments, Services, ConfigMaps and RBAC
//! objects the pod-running kinds own, plus the dependency checks servers and
//! remote proxies share.
//!
//! Every builder is a pure function of its inputs: maps are `BTreeMap`s and
//! lists keep spec order, so the same owner always renders byte-identical
//! children.

use crate::constants::{
    CONTROLLER_NAME, LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME,
};
use crate::controller::kinds::auth_config;
use crate::controller::reconciler::children::Overlay;
use crate::controller::reconciler::status::StatusCollector;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::validate_kubernetes_name;
use crate::crd::{ConditionStatus, LocalRef, McpExternalAuthConfig, McpGroup, MetadataOverrides};
use crate::store::ObjectStore;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec,
    PodTemplateSpec, Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

pub const AUTH_CONFIG_VALIDATED_CONDITION: &str = "AuthConfigValidated";
pub const GROUP_REF_VALIDATED_CONDITION: &str = "GroupRefValidated";
pub const POD_TEMPLATE_VALID_CONDITION: &str = "PodTemplateValid";

/// Pointer the user pod template override is merged at
pub const POD_TEMPLATE_POINTER: &str = "/spec/template";

/// Labels selecting the pods of one workload
#[must_use]
pub fn selector_labels(app: &str, instance: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), app.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_MANAGED_BY.to_string(), CONTROLLER_NAME.to_string()),
    ])
}

/// Controller owner reference pointing at `owner`
///
/// # Errors
///
/// Fails when `owner` has not been persisted yet (no uid).
pub fn owner_reference<K>(owner: &K) -> Result<OwnerReference, ReconcilerError>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        anyhow::anyhow!(
            "{} {} has no uid yet",
            K::kind(&()),
            owner.meta().name.as_deref().unwrap_or_default()
        )
        .into()
    })
}

/// Child metadata; generated labels and annotations win over overrides
#[must_use]
pub fn child_meta(
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    owner: &OwnerReference,
    overrides: Option<&MetadataOverrides>,
) -> ObjectMeta {
    let mut all_labels = overrides.map(|o| o.labels.clone()).unwrap_or_default();
    all_labels.extend(labels.clone());
    let annotations = overrides
        .map(|o| o.annotations.clone())
        .filter(|a| !a.is_empty());
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(all_labels),
        annotations,
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

/// Single-container pod exposing `port` as `http`
#[must_use]
pub fn http_container(
    name: &str,
    image: &str,
    args: Vec<String>,
    env: Vec<EnvVar>,
    port: i32,
) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: (!args.is_empty()).then_some(args),
        env: (!env.is_empty()).then_some(env),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Volume backed by a ConfigMap, mounted read-only at `mount_path`
#[must_use]
pub fn config_map_volume(volume: &str, config_map: &str, mount_path: &str) -> (Volume, VolumeMount) {
    (
        Volume {
            name: volume.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
    )
}

/// Deployment starting at one replica; scalers own the count afterwards
#[must_use]
pub fn deployment(
    meta: ObjectMeta,
    selector: &BTreeMap<String, String>,
    pod_annotations: BTreeMap<String, String>,
    container: Container,
    volumes: Vec<Volume>,
) -> Deployment {
    Deployment {
        metadata: meta,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector.clone()),
                    annotations: (!pod_annotations.is_empty()).then_some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// ClusterIP Service forwarding `port` to the pods' `port`
#[must_use]
pub fn service(meta: ObjectMeta, selector: &BTreeMap<String, String>, port: i32) -> Service {
    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Rules the in-pod runner needs to manage the MCP server it launches
#[must_use]
pub fn runner_rules() -> Vec<PolicyRule> {
    let rule = |group: &str, resources: &[&str], verbs: &[&str]| PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(ToString::to_string).collect()),
        verbs: verbs.iter().map(ToString::to_string).collect(),
        ..Default::default()
    };
    let manage = ["get", "list", "watch", "create", "update", "patch", "delete"];
    vec![
        rule("apps", &["statefulsets"], &manage),
        rule("", &["services"], &manage),
        rule("", &["pods"], &["get", "list", "watch"]),
        rule("", &["pods/log"], &["get"]),
        rule("", &["pods/attach"], &["create", "get"]),
    ]
}

#[must_use]
pub fn service_account(meta: ObjectMeta) -> ServiceAccount {
    ServiceAccount {
        metadata: meta,
        ..Default::default()
    }
}

#[must_use]
pub fn role(meta: ObjectMeta, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: meta,
        rules: Some(rules),
    }
}

/// Binds the Role of the same name to the ServiceAccount of the same name
#[must_use]
pub fn role_binding(meta: ObjectMeta) -> RoleBinding {
    let name = meta.name.clone().unwrap_or_default();
    let namespace = meta.namespace.clone();
    RoleBinding {
        metadata: meta,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace,
            ..Default::default()
        }]),
    }
}

#[must_use]
pub fn config_map(meta: ObjectMeta, key: &str, contents: String) -> ConfigMap {
    ConfigMap {
        metadata: meta,
        data: Some(BTreeMap::from([(key.to_string(), contents)])),
        ..Default::default()
    }
}

/// At least one pod is serving
#[must_use]
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
        >= 1
}

#[must_use]
pub fn service_url(service: &str, namespace: &str, port: i32) -> String {
    format!("http://{service}.{namespace}.svc.cluster.local:{port}")
}

/// Overlay for a user pod template override, if any
#[must_use]
pub fn pod_template_overlay(pod_template_spec: Option<&serde_json::Value>) -> Option<Overlay<'_>> {
    pod_template_spec.map(|patch| Overlay {
        pointer: POD_TEMPLATE_POINTER,
        patch,
    })
}

/// Check the group and auth config a workload points at
///
/// Malformed reference names fail validation before any lookup.
/// Records `GroupRefValidated` and `AuthConfigValidated` and returns the
/// referenced auth config's current hash, computed here from the same inputs
/// the auth config kind hashes so a not-yet-updated `status.configHash` is
/// never acted on.
///
/// # Errors
///
/// [`ReconcilerError::Validation`] for a malformed name and
/// [`ReconcilerError::DependencyMissing`] naming the absent reference.
pub async fn check_dependencies<S, T>(
    ctx: &Reconciler<S>,
    namespace: &str,
    auth_config_ref: Option<&LocalRef>,
    group_ref: Option<&LocalRef>,
    status: &mut StatusCollector<T>,
) -> Result<Option<String>, ReconcilerError>
where
    S: ObjectStore,
    T: Serialize + DeserializeOwned + Default + Clone + PartialEq,
{
    for (field, reference) in [
        ("spec.groupRef.name", group_ref),
        ("spec.authConfigRef.name", auth_config_ref),
    ] {
        if let Some(reference) = reference {
            validate_kubernetes_name(&reference.name, field)
                .map_err(|e| ReconcilerError::Validation(e.to_string()))?;
        }
    }

    match group_ref {
        Some(group) => {
            if ctx
                .store
                .get::<McpGroup>(namespace, &group.name)
                .await?
                .is_none()
            {
                let message = format!("MCPGroup {} not found", group.name);
                status.set_condition(
                    GROUP_REF_VALIDATED_CONDITION,
                    ConditionStatus::False,
                    "GroupNotFound",
                    message.clone(),
                );
                return Err(ReconcilerError::DependencyMissing(message));
            }
            status.set_condition(
                GROUP_REF_VALIDATED_CONDITION,
                ConditionStatus::True,
                "GroupFound",
                "",
            );
        }
        None => status.set_condition(
            GROUP_REF_VALIDATED_CONDITION,
            ConditionStatus::True,
            "NotRequired",
            "",
        ),
    }

    let Some(auth_ref) = auth_config_ref else {
        status.set_condition(
            AUTH_CONFIG_VALIDATED_CONDITION,
            ConditionStatus::True,
            "NotRequired",
            "",
        );
        return Ok(None);
    };
    let Some(auth) = ctx
        .store
        .get::<McpExternalAuthConfig>(namespace, &auth_ref.name)
        .await?
    else {
        let message = format!("MCPExternalAuthConfig {} not found", auth_ref.name);
        status.set_condition(
            AUTH_CONFIG_VALIDATED_CONDITION,
            ConditionStatus::False,
            "AuthConfigNotFound",
            message.clone(),
        );
        return Err(ReconcilerError::DependencyMissing(message));
    };
    if let Err(e) = auth_config::validate(&auth.spec) {
        let message = format!("MCPExternalAuthConfig {} is invalid: {e}", auth_ref.name);
        status.set_condition(
            AUTH_CONFIG_VALIDATED_CONDITION,
            ConditionStatus::False,
            "AuthConfigInvalid",
            message.clone(),
        );
        return Err(ReconcilerError::DependencyMissing(message));
    }
    let hash = auth_config::config_hash(&auth, ctx.store.as_ref()).await?;
    status.set_condition(
        AUTH_CONFIG_VALIDATED_CONDITION,
        ConditionStatus::True,
        "AuthConfigFound",
        "",
    );
    Ok(Some(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "mcp.octopilot.io/v1alpha1".to_string(),
            kind: "MCPServer".to_string(),
            name: "fetch".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_generated_labels_win_over_overrides() {
        let labels = selector_labels("mcp-server", "fetch", "workload");
        let overrides = MetadataOverrides {
            labels: BTreeMap::from([
                (LABEL_INSTANCE.to_string(), "hijack".to_string()),
                ("team".to_string(), "platform".to_string()),
            ]),
            annotations: BTreeMap::new(),
        };
        let meta = child_meta("fetch", "default", &labels, &owner(), Some(&overrides));
        let got = meta.labels.unwrap();
        assert_eq!(got[LABEL_INSTANCE], "fetch");
        assert_eq!(got["team"], "platform");
        assert!(meta.annotations.is_none());
    }

    #[test]
    fn test_builders_are_deterministic() {
        let build = || {
            let labels = selector_labels("mcp-server", "fetch", "workload");
            let meta = child_meta("fetch", "default", &labels, &owner(), None);
            let annotations = BTreeMap::from([
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ]);
            let container = http_container("mcp", "runner:1", vec!["run".to_string()], vec![], 8080);
            serde_json::to_string(&deployment(meta, &labels, annotations, container, vec![]))
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_deployment_readiness() {
        let labels = selector_labels("mcp-server", "fetch", "workload");
        let meta = child_meta("fetch", "default", &labels, &owner(), None);
        let container = http_container("mcp", "runner:1", vec![], vec![], 8080);
        let mut d = deployment(meta, &labels, BTreeMap::new(), container, vec![]);
        assert!(!is_deployment_ready(&d));
        d.status = Some(DeploymentStatus {
            ready_replicas: Some(1),
            ..Default::default()
        });
        assert!(is_deployment_ready(&d));
    }

    #[test]
    fn test_service_url() {
        assert_eq!(
            service_url("mcp-fetch-proxy", "tools", 8080),
            "http://mcp-fetch-proxy.tools.svc.cluster.local:8080"
        );
    }

    #[test]
    fn test_role_binding_points_at_same_named_role_and_account() {
        let labels = selector_labels("mcp-server", "fetch", "rbac");
        let binding = role_binding(child_meta("fetch-proxy-runner", "tools", &labels, &owner(), None));
        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(binding.role_ref.name, "fetch-proxy-runner");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "fetch-proxy-runner");
        assert_eq!(subject.namespace.as_deref(), Some("tools"));
    }

    #[test]
    fn test_runner_rules_cover_statefulsets_and_pods() {
        let rules = runner_rules();
        let statefulsets = rules
            .iter()
            .find(|r| r.resources.as_deref() == Some(&["statefulsets".to_string()][..]))
            .unwrap();
        assert_eq!(statefulsets.api_groups.as_deref(), Some(&["apps".to_string()][..]));
        assert!(statefulsets.verbs.contains(&"delete".to_string()));
        let pods = rules
            .iter()
            .find(|r| r.resources.as_deref() == Some(&["pods".to_string()][..]))
            .unwrap();
        assert!(!pods.verbs.contains(&"delete".to_string()));
    }
}
