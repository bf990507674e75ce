//! # Reference Index
//!
//! Reverse lookup from a referenced object to the managed resources that point
//! at it, e.g. every MCPServer whose `authConfigRef` names a given
//! MCPExternalAuthConfig.
//!
//! The index is owned by the runtime and fed exclusively by watch events
//! ([`apply_event`]). Reconcile passes only read it. A relist
//! (`Init`/`InitApply`/`InitDone`) rebuilds the edges of one referencing kind
//! atomically, so lookups never observe a half-built kind.

use kube::Resource;
use kube_runtime::watcher;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Kinds that can appear on either end of a reference edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Server,
    RemoteProxy,
    AuthConfig,
    Group,
    Registry,
    Secret,
    ConfigMap,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Server => "MCPServer",
            ResourceKind::RemoteProxy => "MCPRemoteProxy",
            ResourceKind::AuthConfig => "MCPExternalAuthConfig",
            ResourceKind::Group => "MCPGroup",
            ResourceKind::Registry => "MCPRegistry",
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a reference edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference to `obj` itself, if it has a namespace and a name
    pub fn of<K: Referencing>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        Some(Self::new(
            K::REF_KIND,
            meta.namespace.clone()?,
            meta.name.clone()?,
        ))
    }
}

impl std::fmt::Display for ResourceRef {
    /// `Kind/name`, the form used in status messages
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Objects whose outgoing references are tracked by the index
pub trait Referencing: Resource {
    const REF_KIND: ResourceKind;

    /// Objects this one points at, all in its own namespace
    fn references(&self) -> Vec<ResourceRef> {
        Vec::new()
    }
}

type Entry = (ResourceRef, Vec<ResourceRef>);

#[derive(Debug, Default)]
struct IndexState {
    forward: HashMap<ResourceRef, BTreeSet<ResourceRef>>,
    reverse: HashMap<ResourceRef, BTreeSet<ResourceRef>>,
    // Relist buffers per referencing kind, swapped in on InitDone
    pending: HashMap<ResourceKind, Vec<Entry>>,
}

impl IndexState {
    fn unlink(&mut self, source: &ResourceRef) {
        let Some(targets) = self.forward.remove(source) else {
            return;
        };
        for target in targets {
            if let Some(sources) = self.reverse.get_mut(&target) {
                sources.remove(source);
                if sources.is_empty() {
                    self.reverse.remove(&target);
                }
            }
        }
    }

    fn link(&mut self, source: ResourceRef, targets: Vec<ResourceRef>) {
        self.unlink(&source);
        let targets: BTreeSet<ResourceRef> = targets.into_iter().collect();
        if targets.is_empty() {
            return;
        }
        for target in &targets {
            self.reverse
                .entry(target.clone())
                .or_default()
                .insert(source.clone());
        }
        self.forward.insert(source, targets);
    }
}

/// Shared, cheaply clonable reverse-reference index
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    state: Arc<RwLock<IndexState>>,
}

impl ReferenceIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record (or replace) the outgoing references of `source`
    pub fn observe(&self, source: ResourceRef, targets: Vec<ResourceRef>) {
        self.write().link(source, targets);
    }

    /// Drop every edge starting at `source`
    pub fn forget(&self, source: &ResourceRef) {
        self.write().unlink(source);
    }

    /// Replace all edges of referencing kind `kind` with `entries`
    pub fn replace_kind(&self, kind: ResourceKind, entries: Vec<Entry>) {
        let mut state = self.write();
        let stale: Vec<ResourceRef> = state
            .forward
            .keys()
            .filter(|source| source.kind == kind)
            .cloned()
            .collect();
        for source in &stale {
            state.unlink(source);
        }
        for (source, targets) in entries {
            state.link(source, targets);
        }
    }

    /// Resources referencing `target_kind` `namespace/name`, sorted. Empty when none.
    #[must_use]
    pub fn find_referencing(
        &self,
        target_kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Vec<ResourceRef> {
        let target = ResourceRef::new(target_kind, namespace, name);
        self.read()
            .reverse
            .get(&target)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Like [`Self::find_referencing`], restricted to one referencing kind
    #[must_use]
    pub fn find_referencing_of_kind(
        &self,
        target_kind: ResourceKind,
        namespace: &str,
        name: &str,
        source_kind: ResourceKind,
    ) -> Vec<ResourceRef> {
        self.find_referencing(target_kind, namespace, name)
            .into_iter()
            .filter(|source| source.kind == source_kind)
            .collect()
    }

    /// Targets currently recorded for `source`
    #[must_use]
    pub fn references_of(&self, source: &ResourceRef) -> Vec<ResourceRef> {
        self.read()
            .forward
            .get(source)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn begin_relist(&self, kind: ResourceKind) {
        self.write().pending.insert(kind, Vec::new());
    }

    fn stage(&self, kind: ResourceKind, entry: Entry) {
        self.write().pending.entry(kind).or_default().push(entry);
    }

    fn finish_relist(&self, kind: ResourceKind) {
        let entries = self.write().pending.remove(&kind).unwrap_or_default();
        self.replace_kind(kind, entries);
    }
}

/// Feed one watch event for referencing kind `K` into the index
pub fn apply_event<K: Referencing>(index: &ReferenceIndex, event: &watcher::Event<K>) {
    match event {
        watcher::Event::Apply(obj) => {
            if let Some(source) = ResourceRef::of(obj) {
                index.observe(source, obj.references());
            }
        }
        watcher::Event::Delete(obj) => {
            if let Some(source) = ResourceRef::of(obj) {
                index.forget(&source);
            }
        }
        watcher::Event::Init => index.begin_relist(K::REF_KIND),
        watcher::Event::InitApply(obj) => {
            if let Some(source) = ResourceRef::of(obj) {
                index.stage(K::REF_KIND, (source, obj.references()));
            }
        }
        watcher::Event::InitDone => index.finish_relist(K::REF_KIND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::Server, "default", name)
    }

    fn auth(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::AuthConfig, "default", name)
    }

    #[test]
    fn test_find_referencing_is_sorted_and_tolerates_zero_results() {
        let index = ReferenceIndex::new();
        assert!(index
            .find_referencing(ResourceKind::AuthConfig, "default", "absent")
            .is_empty());

        index.observe(server("b"), vec![auth("shared")]);
        index.observe(server("a"), vec![auth("shared")]);
        let found = index.find_referencing(ResourceKind::AuthConfig, "default", "shared");
        assert_eq!(found, vec![server("a"), server("b")]);
    }

    #[test]
    fn test_observe_replaces_previous_edges() {
        let index = ReferenceIndex::new();
        index.observe(server("a"), vec![auth("old")]);
        index.observe(server("a"), vec![auth("new")]);
        assert!(index
            .find_referencing(ResourceKind::AuthConfig, "default", "old")
            .is_empty());
        assert_eq!(
            index.find_referencing(ResourceKind::AuthConfig, "default", "new"),
            vec![server("a")]
        );
    }

    #[test]
    fn test_lookup_is_namespace_scoped() {
        let index = ReferenceIndex::new();
        index.observe(
            ResourceRef::new(ResourceKind::Server, "team-a", "s"),
            vec![ResourceRef::new(ResourceKind::AuthConfig, "team-a", "shared")],
        );
        assert!(index
            .find_referencing(ResourceKind::AuthConfig, "team-b", "shared")
            .is_empty());
    }

    #[test]
    fn test_forget_removes_edges() {
        let index = ReferenceIndex::new();
        index.observe(server("a"), vec![auth("shared")]);
        index.forget(&server("a"));
        assert!(index
            .find_referencing(ResourceKind::AuthConfig, "default", "shared")
            .is_empty());
        assert!(index.references_of(&server("a")).is_empty());
    }

    #[test]
    fn test_relist_swaps_in_atomically() {
        let index = ReferenceIndex::new();
        index.observe(server("gone"), vec![auth("shared")]);
        let proxy = ResourceRef::new(ResourceKind::RemoteProxy, "default", "p");
        index.observe(proxy.clone(), vec![auth("shared")]);

        index.begin_relist(ResourceKind::Server);
        index.stage(ResourceKind::Server, (server("kept"), vec![auth("shared")]));
        // Old edges stay visible until the relist completes
        assert_eq!(
            index.find_referencing(ResourceKind::AuthConfig, "default", "shared"),
            vec![server("gone"), proxy.clone()]
        );
        index.finish_relist(ResourceKind::Server);
        assert_eq!(
            index.find_referencing(ResourceKind::AuthConfig, "default", "shared"),
            vec![server("kept"), proxy]
        );
    }

    #[test]
    fn test_find_referencing_of_kind_filters_sources() {
        let index = ReferenceIndex::new();
        let group = ResourceRef::new(ResourceKind::Group, "default", "eng");
        let proxy = ResourceRef::new(ResourceKind::RemoteProxy, "default", "p");
        index.observe(server("s"), vec![group.clone()]);
        index.observe(proxy.clone(), vec![group]);
        assert_eq!(
            index.find_referencing_of_kind(
                ResourceKind::Group,
                "default",
                "eng",
                ResourceKind::RemoteProxy
            ),
            vec![proxy]
        );
    }

    #[test]
    fn test_display_uses_kind_and_name() {
        assert_eq!(server("a").to_string(), "MCPServer/a");
    }
}
