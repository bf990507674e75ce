//! # Kubernetes Store
//!
//! [`ObjectStore`] backed by the API server through `kube::Api`.

use crate::store::{kind_of, object_key, Object, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

/// Body for `PUT .../status`
///
/// The whole status is replaced, so fields the caller cleared are dropped on
/// the server too. `metadata.resourceVersion` is required and acts as the
/// optimistic-concurrency precondition.
pub(crate) fn status_replace_body<K: Object>(obj: &K) -> Result<Vec<u8>, StoreError> {
    let name = obj.meta().name.clone().unwrap_or_default();
    if obj.meta().resource_version.is_none() {
        return Err(StoreError::Invalid(format!(
            "{} {name}: status replace needs metadata.resourceVersion",
            kind_of::<K>()
        )));
    }
    serde_json::to_vec(obj)
        .map_err(|e| StoreError::Invalid(format!("failed to serialize {name}: {e}")))
}

/// Translate API errors into the store taxonomy
fn map_error<K: Object>(error: kube::Error, namespace: &str, name: &str) -> StoreError {
    let kind = kind_of::<K>();
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message.clone(),
        },
        kube::Error::Api(api_err) if api_err.code == 422 => {
            StoreError::Invalid(format!("{kind} {namespace}/{name}: {}", api_err.message))
        }
        other => StoreError::Transport(anyhow::Error::new(other)),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        match self.api::<K>(namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(map_error::<K>(e, namespace, name)),
        }
    }

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        self.api::<K>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| map_error::<K>(e, namespace, ""))
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = object_key(obj)?;
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(e, &namespace, &name))
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = object_key(obj)?;
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(e, &namespace, &name))
    }

    async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = object_key(obj)?;
        let body = status_replace_body(obj)?;
        self.api::<K>(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| map_error::<K>(e, &namespace, &name))
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(map_error::<K>(e, namespace, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{McpServer, McpServerStatus};
    use serde_json::{json, Value};

    fn server(resource_version: Option<&str>) -> McpServer {
        let mut metadata = json!({ "name": "fetch", "namespace": "default" });
        if let Some(version) = resource_version {
            metadata["resourceVersion"] = json!(version);
        }
        serde_json::from_value(json!({
            "apiVersion": "mcp.octopilot.io/v1alpha1",
            "kind": "MCPServer",
            "metadata": metadata,
            "spec": { "image": "ghcr.io/example/fetch-mcp:1.2.0" },
        }))
        .unwrap()
    }

    #[test]
    fn test_status_body_omits_cleared_fields() {
        let mut obj = server(Some("7"));
        obj.status = Some(McpServerStatus {
            url: Some("http://mcp-fetch-proxy.default.svc.cluster.local:8080".to_string()),
            auth_config_hash: None,
            ..McpServerStatus::default()
        });

        let body: Value = serde_json::from_slice(&status_replace_body(&obj).unwrap()).unwrap();

        assert_eq!(body["metadata"]["resourceVersion"], "7");
        let status = body["status"].as_object().unwrap();
        assert!(status.contains_key("url"));
        // Absent from a full replace means removed server-side
        assert!(!status.contains_key("authConfigHash"));
    }

    #[test]
    fn test_status_body_requires_resource_version() {
        let err = status_replace_body(&server(None)).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
