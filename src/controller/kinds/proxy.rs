//! # MCPRemoteProxy
//!
//! Fronts an MCP endpoint outside the cluster with an in-cluster proxy
//! Deployment (`<name>`) and Service (`mcp-<name>-proxy`).

use crate::constants::AUTH_CONFIG_HASH_ANNOTATION;
use crate::controller::kinds::server::proxy_service_name;
use crate::controller::kinds::workload::{self, POD_TEMPLATE_VALID_CONDITION};
use crate::controller::reconciler::children::{converge_child, render_desired};
use crate::controller::reconciler::reconcile::{Convergence, ManagedResource};
use crate::controller::reconciler::references::{Referencing, ResourceKind, ResourceRef};
use crate::controller::reconciler::status::{HasStatus, StatusCollector, SubState};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::validate_remote_url;
use crate::crd::{ConditionStatus, McpRemoteProxy, McpRemoteProxyStatus};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;

pub const FINALIZER: &str = "mcpremoteproxy.mcp.octopilot.io/finalizer";

const APP_LABEL: &str = "mcp-remote-proxy";
const CONTAINER_NAME: &str = "proxy";

impl HasStatus for McpRemoteProxy {
    type Status = McpRemoteProxyStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl Referencing for McpRemoteProxy {
    const REF_KIND: ResourceKind = ResourceKind::RemoteProxy;

    fn references(&self) -> Vec<ResourceRef> {
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        let auth = self
            .spec
            .auth_config_ref
            .iter()
            .map(|r| ResourceRef::new(ResourceKind::AuthConfig, namespace.clone(), r.name.clone()));
        let group = self
            .spec
            .group_ref
            .iter()
            .map(|r| ResourceRef::new(ResourceKind::Group, namespace.clone(), r.name.clone()));
        auth.chain(group).collect()
    }
}

#[async_trait]
impl ManagedResource for McpRemoteProxy {
    const FINALIZER: &'static str = FINALIZER;

    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError> {
        validate_remote_url(&self.spec.remote_url, "spec.remoteUrl")
            .map_err(|e| ReconcilerError::Validation(e.to_string()))?;
        if !(1..=65535).contains(&self.spec.port) {
            return Err(ReconcilerError::Validation(format!(
                "spec.port {} is outside 1-65535",
                self.spec.port
            )));
        }
        let name = self.metadata.name.clone().unwrap_or_default();
        let namespace = self.metadata.namespace.clone().unwrap_or_default();

        let auth_hash = workload::check_dependencies(
            ctx,
            &namespace,
            self.spec.auth_config_ref.as_ref(),
            self.spec.group_ref.as_ref(),
            status,
        )
        .await?;

        let owner = workload::owner_reference(self)?;
        let labels = workload::selector_labels(APP_LABEL, &name, "proxy");
        let overrides = self.spec.resource_overrides.as_ref();

        let mut pod_annotations = BTreeMap::new();
        if let Some(hash) = &auth_hash {
            pod_annotations.insert(AUTH_CONFIG_HASH_ANNOTATION.to_string(), hash.clone());
        }
        let mut args = vec![
            "proxy".to_string(),
            "--remote-url".to_string(),
            self.spec.remote_url.trim().to_string(),
            "--port".to_string(),
            self.spec.port.to_string(),
        ];
        if let Some(auth) = &self.spec.auth_config_ref {
            args.extend(["--auth-config".to_string(), auth.name.clone()]);
        }
        let container = workload::http_container(
            CONTAINER_NAME,
            &ctx.config.proxy_image,
            args,
            Vec::new(),
            self.spec.port,
        );
        let deployment_meta = workload::child_meta(
            &name,
            &namespace,
            &labels,
            &owner,
            overrides.and_then(|o| o.deployment.as_ref()),
        );
        let deployment =
            workload::deployment(deployment_meta, &labels, pod_annotations, container, Vec::new());

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
        let service_meta = workload::child_meta(
            &service_name,
            &namespace,
            &labels,
            &owner,
            overrides.and_then(|o| o.service.as_ref()),
        );
        let service = workload::service(service_meta, &labels, self.spec.port);

        let live = converge_child::<Deployment, S>(ctx.store.as_ref(), &deployment, overlay).await?;
        converge_child::<Service, S>(ctx.store.as_ref(), &service, None).await?;

        status.set_field("url", workload::service_url(&service_name, &namespace, self.spec.port));
        status.set_field("authConfigHash", &auth_hash);

        if workload::is_deployment_ready(&live) {
            Ok(Convergence::new(vec![SubState::Ready]))
        } else {
            status.set_message("Waiting for the proxy pod to become ready");
            Ok(Convergence::new(vec![SubState::Pending]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{LocalRef, McpRemoteProxySpec};

    #[test]
    fn test_references_without_group() {
        let mut proxy = McpRemoteProxy::new(
            "vendor",
            McpRemoteProxySpec {
                remote_url: "https://mcp.vendor.example/v1".to_string(),
                port: 8080,
                auth_config_ref: Some(LocalRef { name: "vendor-auth".to_string() }),
                group_ref: None,
                pod_template_spec: None,
                resource_overrides: None,
            },
        );
        proxy.metadata.namespace = Some("tools".to_string());
        assert_eq!(
            proxy.references(),
            vec![ResourceRef::new(ResourceKind::AuthConfig, "tools", "vendor-auth")]
        );
    }
}
