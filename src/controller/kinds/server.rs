//! # MCPServer
//!
//! Runs one MCP server through the runner image.
//!
//! Children, all owner-referenced:
//! - `ServiceAccount`, `Role` and `RoleBinding` `<name>-proxy-runner` the
//!   runner uses to manage the server it launches
//! - `ConfigMap <name>-runconfig` holding the canonical run configuration
//! - `Deployment <name>` with a single `mcp` container
//! - `Service mcp-<name>-proxy`
//!
//! The pod template is annotated with the run configuration checksum, the
//! referenced auth config hash and any `restarted-at` request found on the
//! MCPServer itself, so a change to any of them rolls the pods.

use crate::constants::{
    AUTH_CONFIG_HASH_ANNOTATION, RESTARTED_AT_ANNOTATION, RUN_CONFIG_CHECKSUM_ANNOTATION,
};
use crate::controller::kinds::workload::{
    self, POD_TEMPLATE_VALID_CONDITION,
};
use crate::controller::reconciler::children::{converge_child, render_desired};
use crate::controller::reconciler::hash::{canonical_json, hash_value};
use crate::controller::reconciler::reconcile::{Convergence, ManagedResource};
use crate::controller::reconciler::references::{Referencing, ResourceKind, ResourceRef};
use crate::controller::reconciler::status::{HasStatus, StatusCollector, SubState};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ConditionStatus, McpServer, McpServerStatus};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const FINALIZER: &str = "mcpserver.mcp.octopilot.io/finalizer";

const APP_LABEL: &str = "mcp-server";
const CONTAINER_NAME: &str = "mcp";
const RUN_CONFIG_KEY: &str = "runconfig.json";
const RUN_CONFIG_MOUNT: &str = "/etc/mcp";

#[must_use]
pub fn run_config_name(name: &str) -> String {
    format!("{name}-runconfig")
}

#[must_use]
pub fn proxy_service_name(name: &str) -> String {
    format!("mcp-{name}-proxy")
}

/// ServiceAccount, Role and RoleBinding name for the runner
#[must_use]
pub fn runner_rbac_name(name: &str) -> String {
    format!("{name}-proxy-runner")
}

/// Restart request copied from the MCPServer onto its pod template
#[must_use]
pub fn restart_request(server: &McpServer) -> Option<&str> {
    server
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(RESTARTED_AT_ANNOTATION))
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

#[must_use]
pub fn headless_service_name(name: &str) -> String {
    format!("mcp-{name}-headless")
}

/// Run configuration read by the runner; key order is canonicalised on write
#[must_use]
pub fn run_config(server: &McpServer) -> Value {
    let env: BTreeMap<&str, &str> = server
        .spec
        .env
        .iter()
        .map(|e| (e.name.as_str(), e.value.as_str()))
        .collect();
    json!({
        "name": server.metadata.name,
        "image": server.spec.image,
        "transport": server.spec.transport.as_str(),
        "port": server.spec.port,
        "args": server.spec.args,
        "env": env,
        "group": server.spec.group_ref.as_ref().map(|g| g.name.clone()),
    })
}

fn validate(server: &McpServer) -> Result<(), ReconcilerError> {
    if server.spec.image.trim().is_empty() {
        return Err(ReconcilerError::Validation("spec.image cannot be empty".to_string()));
    }
    if !(1..=65535).contains(&server.spec.port) {
        return Err(ReconcilerError::Validation(format!(
            "spec.port {} is outside 1-65535",
            server.spec.port
        )));
    }
    Ok(())
}

impl HasStatus for McpServer {
    type Status = McpServerStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl Referencing for McpServer {
    const REF_KIND: ResourceKind = ResourceKind::Server;

    fn references(&self) -> Vec<ResourceRef> {
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        let mut refs = Vec::new();
        if let Some(auth) = &self.spec.auth_config_ref {
            refs.push(ResourceRef::new(ResourceKind::AuthConfig, namespace.clone(), auth.name.clone()));
        }
        if let Some(group) = &self.spec.group_ref {
            refs.push(ResourceRef::new(ResourceKind::Group, namespace, group.name.clone()));
        }
        refs
    }
}

#[async_trait]
impl ManagedResource for McpServer {
    const FINALIZER: &'static str = FINALIZER;

    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError> {
        validate(self)?;
        let name = self.metadata.name.clone().unwrap_or_default();
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        let store = ctx.store.as_ref();

        let auth_hash = workload::check_dependencies(
            ctx,
            &namespace,
            self.spec.auth_config_ref.as_ref(),
            self.spec.group_ref.as_ref(),
            status,
        )
        .await?;

        let owner = workload::owner_reference(self)?;
        let labels = workload::selector_labels(APP_LABEL, &name, "workload");
        let overrides = self.spec.resource_overrides.as_ref();

        let config = run_config(self);
        let checksum = hash_value(&config);
        let run_config_map = workload::config_map(
            workload::child_meta(&run_config_name(&name), &namespace, &labels, &owner, None),
            RUN_CONFIG_KEY,
            canonical_json(&config),
        );

        let mut pod_annotations =
            BTreeMap::from([(RUN_CONFIG_CHECKSUM_ANNOTATION.to_string(), checksum.clone())]);
        if let Some(hash) = &auth_hash {
            pod_annotations.insert(AUTH_CONFIG_HASH_ANNOTATION.to_string(), hash.clone());
        }
        if let Some(requested) = restart_request(self) {
            pod_annotations.insert(RESTARTED_AT_ANNOTATION.to_string(), requested.to_string());
        }
        let (volume, mount) =
            workload::config_map_volume("runconfig", &run_config_name(&name), RUN_CONFIG_MOUNT);
        let mut container = workload::http_container(
            CONTAINER_NAME,
            &ctx.config.runner_image,
            vec![
                "run".to_string(),
                "--runconfig".to_string(),
                format!("{RUN_CONFIG_MOUNT}/{RUN_CONFIG_KEY}"),
            ],
            Vec::new(),
            self.spec.port,
        );
        container.volume_mounts = Some(vec![mount]);
        let rbac_name = runner_rbac_name(&name);
        let rbac_labels = workload::selector_labels(APP_LABEL, &name, "rbac");
        let rbac_meta = || workload::child_meta(&rbac_name, &namespace, &rbac_labels, &owner, None);
        let service_account = workload::service_account(rbac_meta());
        let role = workload::role(rbac_meta(), workload::runner_rules());
        let role_binding = workload::role_binding(rbac_meta());

        let mut deployment = workload::deployment(
            workload::child_meta(&name, &namespace, &labels, &owner, overrides.and_then(|o| o.deployment.as_ref())),
            &labels,
            pod_annotations,
            container,
            vec![volume],
        );
        if let Some(pod) = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
        {
            pod.service_account_name = Some(rbac_name.clone());
        }

        // Reject a bad override before touching any child
        let overlay = workload::pod_template_overlay(self.spec.pod_template_spec.as_ref());
        if let Err(e) = render_desired(&deployment, overlay) {
            status.set_condition(
                POD_TEMPLATE_VALID_CONDITION,
                ConditionStatus::False,
                "InvalidPodTemplateSpec",
                e.to_string(),
            );
            return Err(e);
        }
        status.set_condition(POD_TEMPLATE_VALID_CONDITION, ConditionStatus::True, "Valid", "");

        let service_name = proxy_service_name(&name);
        let service = workload::service(
            workload::child_meta(&service_name, &namespace, &labels, &owner, overrides.and_then(|o| o.service.as_ref())),
            &labels,
            self.spec.port,
        );

        // The pods need their ServiceAccount before they can be scheduled
        converge_child::<ServiceAccount, S>(store, &service_account, None).await?;
        converge_child::<Role, S>(store, &role, None).await?;
        converge_child::<RoleBinding, S>(store, &role_binding, None).await?;
        converge_child::<ConfigMap, S>(store, &run_config_map, None).await?;
        let live = converge_child::<Deployment, S>(store, &deployment, overlay).await?;
        converge_child::<Service, S>(store, &service, None).await?;

        status.set_field("url", workload::service_url(&service_name, &namespace, self.spec.port));
        status.set_field("authConfigHash", &auth_hash);
        status.set_field("runConfigChecksum", &checksum);

        let ready = workload::is_deployment_ready(&live);
        if !ready {
            status.set_message("Waiting for the server pod to become ready");
        }
        Ok(Convergence::new(vec![if ready {
            SubState::Ready
        } else {
            SubState::Pending
        }]))
    }

    async fn cleanup<S: ObjectStore>(&self, ctx: &Reconciler<S>) -> Result<(), ReconcilerError> {
        let name = self.metadata.name.clone().unwrap_or_default();
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        // Created by the in-pod runner, so no owner reference covers them
        let statefulset = ctx.store.delete::<StatefulSet>(&namespace, &name).await;
        let headless = ctx
            .store
            .delete::<Service>(&namespace, &headless_service_name(&name))
            .await;
        for (what, result) in [("StatefulSet", statefulset), ("headless Service", headless)] {
            match result {
                Ok(()) => debug!("Cleaned up {what} for MCPServer {namespace}/{name}"),
                Err(e) => warn!("⚠️  Could not delete {what} for MCPServer {namespace}/{name}: {e}"),
            }
        }
        Ok(())
    }
}
