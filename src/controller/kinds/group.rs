//! # MCPGroup
//!
//! Reports the servers and remote proxies whose `groupRef` names the group.
//! Members are listed from the store on every pass rather than taken from the
//! reference index, so the report never includes a member already gone.

use crate::controller::reconciler::reconcile::{Convergence, ManagedResource};
use crate::controller::reconciler::references::{Referencing, ResourceKind};
use crate::controller::reconciler::status::{HasStatus, StatusCollector, SubState};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ConditionStatus, LocalRef, McpGroup, McpGroupStatus, McpRemoteProxy, McpServer};
use crate::store::ObjectStore;
use async_trait::async_trait;

pub const FINALIZER: &str = "mcpgroup.mcp.octopilot.io/finalizer";

pub const MEMBERS_DISCOVERED_CONDITION: &str = "MembersDiscovered";

/// Sorted names of the objects pointing at `group`
fn member_names<'a, T: 'a>(
    items: &'a [T],
    group: &str,
    group_ref: impl Fn(&'a T) -> (Option<&'a LocalRef>, Option<&'a str>),
) -> Vec<String> {
    let mut names: Vec<String> = items
        .iter()
        .map(group_ref)
        .filter(|(r, _)| r.is_some_and(|r| r.name == group))
        .filter_map(|(_, name)| name.map(str::to_string))
        .collect();
    names.sort();
    names
}

impl HasStatus for McpGroup {
    type Status = McpGroupStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl Referencing for McpGroup {
    const REF_KIND: ResourceKind = ResourceKind::Group;
}

#[async_trait]
impl ManagedResource for McpGroup {
    const FINALIZER: &'static str = FINALIZER;

    // Members notice the missing group and report it themselves
    const BLOCKS_DELETION_WHILE_REFERENCED: bool = false;

    async fn converge<S: ObjectStore>(
        &self,
        ctx: &Reconciler<S>,
        status: &mut StatusCollector<Self::Status>,
    ) -> Result<Convergence, ReconcilerError> {
        let name = self.metadata.name.clone().unwrap_or_default();
        let namespace = self.metadata.namespace.clone().unwrap_or_default();

        let servers = ctx.store.list::<McpServer>(&namespace).await?;
        let proxies = ctx.store.list::<McpRemoteProxy>(&namespace).await?;
        let servers = member_names(&servers, &name, |s| {
            (s.spec.group_ref.as_ref(), s.metadata.name.as_deref())
        });
        let proxies = member_names(&proxies, &name, |p| {
            (p.spec.group_ref.as_ref(), p.metadata.name.as_deref())
        });

        status.set_condition(
            MEMBERS_DISCOVERED_CONDITION,
            ConditionStatus::True,
            "Discovered",
            format!("{} server(s), {} remote proxy(ies)", servers.len(), proxies.len()),
        );
        status.set_field("serverCount", servers.len());
        status.set_field("servers", &servers);
        status.set_field("remoteProxyCount", proxies.len());
        status.set_field("remoteProxies", &proxies);

        Ok(Convergence::new(vec![SubState::Ready]))
    }
}
