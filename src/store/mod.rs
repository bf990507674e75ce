//! # Object Store
//!
//! The seam between the reconciliation engine and the cluster API.
//!
//! Everything the engine persists goes through [`ObjectStore`]: reads, full
//! replaces guarded by `metadata.resourceVersion`, status-only writes and
//! deletes. [`KubeStore`] talks to the API server; [`MemoryStore`] keeps the
//! same semantics in process for tests.

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::{MemoryStore, WriteOp, WriteRecord};

use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Any namespaced object the store can hold
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    /// The object changed since it was read (resourceVersion mismatch)
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("store request failed: {0}")]
    Transport(#[source] anyhow::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Read/write access to namespaced objects with optimistic concurrency
///
/// `update` and `update_status` must reject the write with
/// [`StoreError::Conflict`] when the object's `resourceVersion` no longer
/// matches the stored one. Objects carrying a controller owner reference are
/// garbage-collected by the store when their owner goes away.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, StoreError>;

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace metadata and spec; status is left untouched
    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace status only
    async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Request deletion. Succeeds when the object is already gone.
    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Kind name of `K`, e.g. `MCPServer`
pub fn kind_of<K: Object>() -> String {
    K::kind(&()).into_owned()
}

/// Namespace and name of an object, rejecting objects without them
pub fn object_key<K: Object>(obj: &K) -> Result<(String, String), StoreError> {
    let meta = obj.meta();
    let namespace = meta
        .namespace
        .clone()
        .ok_or_else(|| StoreError::Invalid(format!("{} without namespace", kind_of::<K>())))?;
    let name = meta
        .name
        .clone()
        .ok_or_else(|| StoreError::Invalid(format!("{} without name", kind_of::<K>())))?;
    Ok((namespace, name))
}
