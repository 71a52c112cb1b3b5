//! Pacemaker Cluster Adapter
//!
//! Builds one resource group per SVM (`fs_`, `netns_`, `ganesha_`
//! members) on top of the shared promotable DRBD resource, and pins the
//! group to the DRBD primary with an order and a colocation constraint.
//! Every resource is checked before it is created, so re-running a
//! partially completed creation picks up where it stopped.

use crate::domain::ports::{ClusterCoordinator, CommandRunnerRef, SvmGroupSpec};
use crate::error::Result;
use crate::exec::Invocation;
use async_trait::async_trait;
use tracing::{debug, info, warn};

const TOOL: &str = "pcs";

/// [`ClusterCoordinator`] backed by the `pcs` shell
pub struct PacemakerCoordinator {
    runner: CommandRunnerRef,
}

impl PacemakerCoordinator {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    fn pcs() -> Invocation {
        Invocation::new(TOOL)
    }

    async fn resource_exists(&self, id: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Self::pcs().args(["resource", "show", id]))
            .await?;
        Ok(out.success())
    }

    /// Run `invocation` unless resource `id` already exists
    async fn ensure_resource(&self, id: &str, invocation: Invocation) -> Result<()> {
        if self.resource_exists(id).await? {
            debug!("Cluster resource {} already exists", id);
            return Ok(());
        }
        self.runner
            .run(&invocation)
            .await?
            .check(TOOL, &format!("create resource {}", id))?;
        info!("Created cluster resource {}", id);
        Ok(())
    }

    async fn constraints(&self) -> Result<String> {
        let out = self
            .runner
            .run(&Self::pcs().args(["constraint", "show", "--full"]))
            .await?
            .check(TOOL, "list constraints")?;
        Ok(out.stdout)
    }

    async fn ensure_drbd(&self, resource: &str) -> Result<String> {
        let primitive = format!("p_drbd_{}", resource);
        let master = format!("ms_drbd_{}", resource);

        self.ensure_resource(
            &primitive,
            Self::pcs().args([
                "resource",
                "create",
                &primitive,
                "ocf:linbit:drbd",
                &format!("drbd_resource={}", resource),
                "op",
                "monitor",
                "interval=29s",
                "role=Master",
                "op",
                "monitor",
                "interval=31s",
                "role=Slave",
            ]),
        )
        .await?;

        self.ensure_resource(
            &master,
            Self::pcs().args([
                "resource",
                "master",
                &master,
                &primitive,
                "master-max=1",
                "master-node-max=1",
                "clone-max=2",
                "clone-node-max=1",
                "notify=true",
            ]),
        )
        .await?;

        Ok(master)
    }

    fn netns_invocation(spec: &SvmGroupSpec, id: &str) -> Invocation {
        let mut params = vec![
            format!("ns={}", spec.svm),
            format!("vlan_id={}", spec.vlan_id),
            format!("parent_if={}", spec.parent_if),
        ];
        if let Some(ifname) = &spec.ifname {
            params.push(format!("ifname={}", ifname));
        }
        params.push(format!("ip={}", spec.ip));
        params.push(format!("prefix={}", spec.prefix));
        if let Some(gw) = &spec.gateway {
            params.push(format!("gw={}", gw));
        }
        params.push(format!("mtu={}", spec.mtu));

        Self::pcs()
            .args([
                "resource".to_string(),
                "create".to_string(),
                id.to_string(),
                format!("ocf:{}:NetnsVlan", spec.ra_vendor),
            ])
            .args(params)
            .args(["op", "monitor", "interval=10s"])
    }

    /// Create the group's member resources and the group itself
    async fn create_group_members(&self, spec: &SvmGroupSpec, group: &str) -> Result<()> {
        let mut members = Vec::new();

        if spec.create_filesystem {
            let fs = format!("fs_{}", spec.svm);
            self.ensure_resource(
                &fs,
                Self::pcs().args([
                    "resource",
                    "create",
                    &fs,
                    "ocf:heartbeat:Filesystem",
                    &format!("device=/dev/{}/vol_{}", spec.vg_name, spec.svm),
                    &format!("directory={}", spec.mount_path),
                    "fstype=xfs",
                    "op",
                    "monitor",
                    "interval=10s",
                ]),
            )
            .await?;
            members.push(fs);
        }

        let netns = format!("netns_{}", spec.svm);
        self.ensure_resource(&netns, Self::netns_invocation(spec, &netns))
            .await?;
        members.push(netns);

        let ganesha = format!("ganesha_{}", spec.svm);
        self.ensure_resource(
            &ganesha,
            Self::pcs().args([
                "resource",
                "create",
                &ganesha,
                &format!("systemd:nfs-ganesha@{}", spec.svm),
                "op",
                "monitor",
                "interval=10s",
            ]),
        )
        .await?;
        members.push(ganesha);

        self.runner
            .run(
                &Self::pcs()
                    .args(["resource", "group", "add", group])
                    .args(members.iter().map(String::as_str)),
            )
            .await?
            .check(TOOL, "create resource group")?;
        info!("Created cluster group {} ({})", group, members.join(", "));

        Ok(())
    }

    /// Pin `group` after and onto the DRBD primary, adding whichever
    /// constraint is missing
    async fn ensure_constraints(&self, master: &str, group: &str) -> Result<()> {
        if !self
            .constraints()
            .await?
            .contains(&format!("promote {} then start {}", master, group))
        {
            self.runner
                .run(&Self::pcs().args([
                    "constraint", "order", "promote", master, "then", "start", group,
                ]))
                .await?
                .check(TOOL, "add order constraint")?;
        }

        if !self
            .constraints()
            .await?
            .contains(&format!("{} with {}", group, master))
        {
            self.runner
                .run(&Self::pcs().args([
                    "constraint",
                    "colocation",
                    "add",
                    group,
                    "with",
                    "master",
                    master,
                    "INFINITY",
                ]))
                .await?
                .check(TOOL, "add colocation constraint")?;
        }

        Ok(())
    }
}

#[async_trait]
impl ClusterCoordinator for PacemakerCoordinator {
    async fn group_exists(&self, svm: &str) -> Result<bool> {
        self.resource_exists(&format!("g_svm_{}", svm)).await
    }

    async fn create_svm_group(&self, spec: &SvmGroupSpec) -> Result<()> {
        let group = spec.group_name();
        let master = self.ensure_drbd(&spec.drbd_resource).await?;

        if self.resource_exists(&group).await? {
            debug!("Cluster group {} already exists", group);
        } else {
            self.create_group_members(spec, &group).await?;
        }

        self.ensure_constraints(&master, &group).await
    }

    async fn delete_svm_group(&self, svm: &str) -> Result<()> {
        let group = format!("g_svm_{}", svm);
        if !self.resource_exists(&group).await? {
            debug!("Cluster group {} not present, nothing to delete", group);
            return Ok(());
        }

        let disabled = self
            .runner
            .run(&Self::pcs().args(["resource", "disable", &group]))
            .await?;
        if !disabled.success() {
            warn!(
                "Failed to disable {} before deletion: {}",
                group,
                disabled.stderr.trim()
            );
        }

        self.runner
            .run(&Self::pcs().args(["resource", "delete", &group]))
            .await?
            .check(TOOL, "delete resource group")?;
        info!("Deleted cluster group {}", group);
        Ok(())
    }
}
