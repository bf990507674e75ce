//! # MCPRegistry
//!
//! Syncs registry data from its source into `<name>-registry-storage` and
//! serves it through the `<name>-api` Deployment and Service.
//!
//! The overall phase comes from two sub-statuses: `syncStatus` (data copied
//! and validated) and `apiStatus` (API pods serving). A ConfigMap source that
//! does not exist yet is a missing dependency; malformed data fails the sync.

use crate::constants::{
    DEFAULT_REGISTRY_SYNC_INTERVAL_SECS, MIN_REGISTRY_SYNC_INTERVAL_SECS,
    REGISTRY_API_PORT, REGISTRY_DATA_HASH_ANNOTATION,
};
use crate::controller::kinds::workload;
use crate::controller::reconciler::children::converge_child;
use crate::controller::reconciler::hash::{canonical_json, hash_value};
use crate::controller::reconciler::reconcile::{Convergence, ManagedResource};
use crate::controller::reconciler::references::{Referencing, ResourceKind, ResourceRef};
use crate::controller::reconciler::status::{HasStatus, StatusCollector, SubState};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::validate_duration_interval;
use crate::crd::{
    ApiPhase, ApiStatus, ConditionStatus, McpRegistry, McpRegistrySpec, McpRegistryStatus,
    SyncPhase, SyncStatus,
};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

pub const FINALIZER: &str = "mcpregistry.mcp.octopilot.io/finalizer";

pub const SYNCED_CONDITION: &str = "Synced";
pub const API_READY_CONDITION: &str = "APIReady";

const APP_LABEL: &str = "mcp-registry";
const CONTAINER_NAME: &str = "registry-api";
const DATA_KEY: &str = "registry.json";
const DATA_MOUNT: &str = "/data";

#[must_use]
pub fn storage_name(name: &str) -> String {
    format!("{name}-registry-storage")
}

#[must_use]
pub fn api_name(name: &str) -> String {
    format!("{name}-api")
}

/// Resync period from `spec.syncInterval`
///
/// # Errors
///
/// Unparseable intervals and intervals under the minimum.
pub fn sync_interval(spec: &McpRegistrySpec) -> Result<Duration, ReconcilerError> {
    match spec.sync_interval.as_deref() {
        None => Ok(Duration::from_secs(DEFAULT_REGISTRY_SYNC_INTERVAL_SECS)),
        Some(interval) => validate_duration_interval(
            interval,
            "spec.syncInterval",
            MIN_REGISTRY_SYNC_INTERVAL_SECS,
        )
        .map_err(|e| ReconcilerError::Validation(e.to_string())),
    }
}

/// Parse registry JSON and return it with its server count
///
/// # Errors
///
/// A message describing why the data is not a registry.
pub fn parse_registry_data(raw: &str) -> Result<(Value, usize), String> {
    let data: Value =
        serde_json::from_str(raw).map_err(|e| format!("registry data is not valid JSON: {e}"))?;
    let Some(root) = data.as_object() else {
        return Err("registry data must be a JSON object".to_string());
    };
    let Some(servers) = root.get("servers").and_then(Value::as_object) else {
        return Err("registry data must contain a \"servers\" object".to_string());
    };
    let count = servers.len();
    Ok((data, count))
}

/// Raw registry data from the configured source
async fn fetch_source<S: ObjectStore>(
    registry: &McpRegistry,
    store: &S,
) -> Result<String, ReconcilerError> {
    let namespace = registry.metadata.namespace.clone().unwrap_or_default();
    let source = &registry.spec.source;
    match (&source.config_map_ref, &source.inline) {
        (Some(cm_ref), None) => {
            let Some(cm) = store.get::<ConfigMap>(&namespace, &cm_ref.name).await? else {
                return Err(ReconcilerError::DependencyMissing(format!(
                    "ConfigMap {} not found",
                    cm_ref.name
                )));
            };
            cm.data
                .and_then(|mut d| d.remove(&cm_ref.key))
                .ok_or_else(|| {
                    ReconcilerError::DependencyMissing(format!(
                        "key {} not found in ConfigMap {}",
                        cm_ref.key, cm_ref.name
                    ))
                })
        }
        (None, Some(inline)) => Ok(inline.clone()),
        _ => Err(ReconcilerError::Validation(
            "spec.source must set exactly one of configMapRef or inline".to_string(),
        )),
    }
}

fn api_sub_state(phase: ApiPhase) -> SubState {
    match phase {
        ApiPhase::Ready => SubState::Ready,
        ApiPhase::NotStarted | ApiPhase::Deploying => SubState::Pending,
    }
}

fn sync_sub_state(phase: SyncPhase) -> SubState {
    match phase {
        SyncPhase::Complete => SubState::Ready,
        SyncPhase::Syncing => SubState::Syncing,
        SyncPhase::Failed => SubState::Failed,
    }
}

impl HasStatus for McpRegistry {
    type Status = McpRegistryStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl Referencing for McpRegistry {
    const REF_KIND: ResourceKind = ResourceKind::Registry;

    fn references(&self) -> Vec<ResourceRef> {
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        self.spec
            .source
            .config_map_ref
            .iter()
            .map(|r| ResourceRef::new(ResourceKind::ConfigMap, namespace.clone(), r.name.clone()))
            .collect()
    }
}

#[async_trait]
impl ManagedResource for McpRegistry {
    const FINALIZER: &'static str = FINALIZER;

    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError> {
        let interval = sync_interval(&self.spec)?;
        let name = self.metadata.name.clone().unwrap_or_default();
        let namespace = self.metadata.namespace.clone().unwrap_or_default();
        let store = ctx.store.as_ref();

        let raw = fetch_source(self, store).await?;
        let (data, server_count) = match parse_registry_data(&raw) {
            Ok(parsed) => parsed,
            Err(message) => {
                warn!("❌ Registry {namespace}/{name} sync failed: {message}");
                status.set_field(
                    "syncStatus",
                    SyncStatus {
                        phase: SyncPhase::Failed,
                        message: Some(message.clone()),
                        last_sync_hash: status
                            .original()
                            .and_then(|s| s.sync_status.as_ref())
                            .and_then(|s| s.last_sync_hash.clone()),
                        server_count: 0,
                    },
                );
                status.set_condition(
                    SYNCED_CONDITION,
                    ConditionStatus::False,
                    "SyncFailed",
                    message.clone(),
                );
                return Err(ReconcilerError::Validation(message));
            }
        };
        let data_hash = hash_value(&data);

        let owner = workload::owner_reference(self)?;
        let labels = workload::selector_labels(APP_LABEL, &name, "registry-api");
        let storage = workload::config_map(
            workload::child_meta(&storage_name(&name), &namespace, &labels, &owner, None),
            DATA_KEY,
            canonical_json(&data),
        );
        converge_child::<ConfigMap, S>(store, &storage, None).await?;

        let previous_hash = status
            .original()
            .and_then(|s| s.sync_status.as_ref())
            .and_then(|s| s.last_sync_hash.clone());
        if previous_hash.as_deref() != Some(data_hash.as_str()) {
            info!("📦 Synced {server_count} server(s) into registry {namespace}/{name}");
        }
        status.set_field(
            "syncStatus",
            SyncStatus {
                phase: SyncPhase::Complete,
                message: None,
                last_sync_hash: Some(data_hash.clone()),
                server_count: i32::try_from(server_count).unwrap_or(i32::MAX),
            },
        );
        status.set_condition(
            SYNCED_CONDITION,
            ConditionStatus::True,
            "SyncComplete",
            format!("{server_count} server(s)"),
        );

        let api = api_name(&name);
        let (volume, mount) = workload::config_map_volume("registry-data", &storage_name(&name), DATA_MOUNT);
        let mut container = workload::http_container(
            CONTAINER_NAME,
            &ctx.config.registry_api_image,
            vec![
                "serve".to_string(),
                "--data".to_string(),
                format!("{DATA_MOUNT}/{DATA_KEY}"),
                "--port".to_string(),
                REGISTRY_API_PORT.to_string(),
            ],
            Vec::new(),
            REGISTRY_API_PORT,
        );
        container.volume_mounts = Some(vec![mount]);
        let deployment = workload::deployment(
            workload::child_meta(&api, &namespace, &labels, &owner, None),
            &labels,
            BTreeMap::from([(REGISTRY_DATA_HASH_ANNOTATION.to_string(), data_hash)]),
            container,
            vec![volume],
        );
        let service = workload::service(
            workload::child_meta(&api, &namespace, &labels, &owner, None),
            &labels,
            REGISTRY_API_PORT,
        );
        let overlay = workload::pod_template_overlay(self.spec.pod_template_spec.as_ref());
        let live = converge_child::<Deployment, S>(store, &deployment, overlay).await?;
        converge_child::<Service, S>(store, &service, None).await?;

        let api_phase = if workload::is_deployment_ready(&live) {
            ApiPhase::Ready
        } else {
            ApiPhase::Deploying
        };
        status.set_field(
            "apiStatus",
            ApiStatus {
                phase: api_phase,
                endpoint: Some(workload::service_url(&api, &namespace, REGISTRY_API_PORT)),
            },
        );
        let (api_ready, api_reason) = match api_phase {
            ApiPhase::Ready => (ConditionStatus::True, "Ready"),
            _ => (ConditionStatus::False, "Deploying"),
        };
        status.set_condition(API_READY_CONDITION, api_ready, api_reason, "");

        Ok(Convergence::new(vec![
            sync_sub_state(SyncPhase::Complete),
            api_sub_state(api_phase),
        ])
        .with_resync(interval))
    }
}
