//! # MCPExternalAuthConfig
//!
//! No children. Each pass hashes the spec together with the referenced secret
//! content, lists the workloads pointing at the config and, when the hash
//! moved, stamps it onto them so they roll.

use crate::constants::AUTH_CONFIG_HASH_ANNOTATION;
use crate::controller::reconciler::hash::{hash_spec, Resolved, SecretResolver, StoreSecretResolver};
use crate::controller::reconciler::reconcile::{Convergence, ManagedResource};
use crate::controller::reconciler::references::{Referencing, ResourceKind, ResourceRef};
use crate::controller::reconciler::status::{HasStatus, StatusCollector, SubState};
use crate::controller::reconciler::trigger::{propagate_annotation, FanOutReport};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::{validate_header_name, validate_remote_url};
use crate::crd::{
    ConditionStatus, ExternalAuthType, McpExternalAuthConfig, McpExternalAuthConfigSpec,
    McpExternalAuthConfigStatus, McpRemoteProxy, McpServer,
};
use crate::store::ObjectStore;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

pub const FINALIZER: &str = "mcpexternalauthconfig.mcp.octopilot.io/finalizer";

pub const SECRETS_RESOLVED_CONDITION: &str = "SecretsResolved";
pub const WORKLOADS_NOTIFIED_CONDITION: &str = "WorkloadsNotified";

/// The block named by `type` is present and well-formed
///
/// # Errors
///
/// Describes the first problem found.
pub fn validate(spec: &McpExternalAuthConfigSpec) -> Result<()> {
    match spec.r#type {
        ExternalAuthType::TokenExchange => {
            let Some(exchange) = spec.token_exchange.as_ref() else {
                return Err(anyhow::anyhow!(
                    "spec.tokenExchange is required when type is tokenExchange"
                ));
            };
            validate_remote_url(&exchange.token_url, "tokenExchange.tokenUrl")?;
            if exchange.client_id.trim().is_empty() {
                return Err(anyhow::anyhow!("tokenExchange.clientId cannot be empty"));
            }
            if exchange.audience.trim().is_empty() {
                return Err(anyhow::anyhow!("tokenExchange.audience cannot be empty"));
            }
        }
        ExternalAuthType::HeaderInjection => {
            let Some(header) = spec.header_injection.as_ref() else {
                return Err(anyhow::anyhow!(
                    "spec.headerInjection is required when type is headerInjection"
                ));
            };
            validate_header_name(&header.header_name)?;
        }
    }
    Ok(())
}

/// Config hash over the spec and the current content of its secrets
///
/// # Errors
///
/// Serialization and store transport failures only.
pub async fn config_hash<S: ObjectStore>(
    auth: &McpExternalAuthConfig,
    store: &S,
) -> Result<String, ReconcilerError> {
    let namespace = auth.metadata.namespace.as_deref().unwrap_or_default();
    hash_spec(
        &auth.spec,
        namespace,
        &auth.spec.secret_refs(),
        &StoreSecretResolver::new(store),
    )
    .await
}

/// Human-readable description of every secret that cannot be read
async fn missing_secrets<S: ObjectStore>(
    auth: &McpExternalAuthConfig,
    store: &S,
) -> Result<Vec<String>, ReconcilerError> {
    let namespace = auth.metadata.namespace.as_deref().unwrap_or_default();
    let resolver = StoreSecretResolver::new(store);
    let mut missing = Vec::new();
    for secret_ref in auth.spec.secret_refs() {
        match resolver.resolve(namespace, secret_ref).await? {
            Resolved::Value(_) => {}
            Resolved::SecretNotFound => missing.push(format!("Secret {} not found", secret_ref.name)),
            Resolved::KeyNotFound => missing.push(format!(
                "key {} not found in Secret {}",
                secret_ref.key, secret_ref.name
            )),
        }
    }
    Ok(missing)
}

async fn notify_workloads<S: ObjectStore>(
    store: &S,
    referencing: &[ResourceRef],
    hash: &str,
) -> FanOutReport {
    let (servers, proxies): (Vec<ResourceRef>, Vec<ResourceRef>) = referencing
        .iter()
        .cloned()
        .partition(|r| r.kind == ResourceKind::Server);
    let mut report =
        propagate_annotation::<McpServer, S>(store, &servers, AUTH_CONFIG_HASH_ANNOTATION, hash)
            .await;
    let proxies: Vec<ResourceRef> = proxies
        .into_iter()
        .filter(|r| r.kind == ResourceKind::RemoteProxy)
        .collect();
    report.merge(
        propagate_annotation::<McpRemoteProxy, S>(store, &proxies, AUTH_CONFIG_HASH_ANNOTATION, hash)
            .await,
    );
    report
}

impl HasStatus for McpExternalAuthConfig {
    type Status = McpExternalAuthConfigStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl Referencing for McpExternalAuthConfig {
    const REF_KIND: ResourceKind = ResourceKind::AuthConfig;

    fn references(&self) -> Vec<ResourceRef> {
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        self.spec
            .secret_refs()
            .into_iter()
            .map(|s| ResourceRef::new(ResourceKind::Secret, namespace.clone(), s.name.clone()))
            .collect()
    }
}

#[async_trait]
impl ManagedResource for McpExternalAuthConfig {
    const FINALIZER: &'static str = FINALIZER;

    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError> {
        validate(&self.spec).map_err(|e| ReconcilerError::Validation(e.to_string()))?;

        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        let name = self.metadata.name.clone().unwrap_or_default();
        let store = ctx.store.as_ref();
        let mut sub_states = Vec::new();

        let hash = config_hash(self, store).await?;
        let missing = missing_secrets(self, store).await?;
        if missing.is_empty() {
            status.set_condition(
                SECRETS_RESOLVED_CONDITION,
                ConditionStatus::True,
                "AllSecretsFound",
                "",
            );
        } else {
            let message = missing.join("; ");
            status.set_condition(
                SECRETS_RESOLVED_CONDITION,
                ConditionStatus::False,
                "SecretNotFound",
                message.clone(),
            );
            status.set_message(message);
            sub_states.push(SubState::Pending);
        }

        let referencing = ctx.index.find_referencing(ResourceKind::AuthConfig, &namespace, &name);
        let workloads: Vec<String> = referencing.iter().map(ToString::to_string).collect();
        status.set_field("referencingWorkloads", &workloads);

        let previous = status.original().and_then(|s| s.config_hash.clone());
        let retry_pending = status
            .original()
            .and_then(|s| {
                s.conditions
                    .iter()
                    .find(|c| c.r#type == WORKLOADS_NOTIFIED_CONDITION)
            })
            .is_some_and(|c| c.status == ConditionStatus::False);
        if previous.as_deref() != Some(hash.as_str()) || retry_pending {
            info!(
                previous = previous.as_deref().unwrap_or("none"),
                current = %hash,
                "🔑 Config hash for {namespace}/{name} changed, notifying {} workload(s)",
                referencing.len()
            );
            let report = notify_workloads(store, &referencing, &hash).await;
            if report.failed.is_empty() {
                status.set_condition(
                    WORKLOADS_NOTIFIED_CONDITION,
                    ConditionStatus::True,
                    "HashPropagated",
                    "",
                );
            } else {
                let failed: Vec<String> = report.failed.iter().map(|(r, _)| r.to_string()).collect();
                status.set_condition(
                    WORKLOADS_NOTIFIED_CONDITION,
                    ConditionStatus::False,
                    "PropagationFailed",
                    format!("Failed to notify {}", failed.join(", ")),
                );
                sub_states.push(SubState::Pending);
            }
        } else {
            debug!("Config hash for {namespace}/{name} unchanged");
        }
        status.set_field("configHash", &hash);

        sub_states.push(SubState::Ready);
        Ok(Convergence::new(sub_states))
    }
}
