//! Network Namespace Adapter
//!
//! Drives `ip` to give each SVM its own namespace with a VLAN
//! sub-interface, address, MTU and default route.

use crate::domain::ports::{CommandRunnerRef, NetworkManager, VlanAttachment};
use crate::error::Result;
use crate::exec::Invocation;
use async_trait::async_trait;
use tracing::{debug, info};

const TOOL: &str = "ip";

/// [`NetworkManager`] backed by iproute2
pub struct IpNetnsManager {
    runner: CommandRunnerRef,
}

impl IpNetnsManager {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    fn ip() -> Invocation {
        Invocation::new(TOOL)
    }

    /// `ip netns exec <ns> ip ...`
    fn in_namespace(namespace: &str) -> Invocation {
        Self::ip().args(["netns", "exec", namespace, TOOL])
    }

    async fn link_in_namespace(&self, namespace: &str, ifname: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Self::in_namespace(namespace).args(["link", "show", ifname]))
            .await?;
        Ok(out.success())
    }

    async fn move_into(&self, namespace: &str, ifname: &str) -> Result<()> {
        self.runner
            .run(&Self::ip().args(["link", "set", ifname, "netns", namespace]))
            .await?
            .check(TOOL, "move interface into namespace")?;
        Ok(())
    }

    async fn configure(&self, attachment: &VlanAttachment, ifname: &str) -> Result<()> {
        let ns = attachment.namespace.as_str();

        let link = self
            .runner
            .run(&Self::in_namespace(ns).args(["-o", "link", "show", "dev", ifname]))
            .await?
            .check(TOOL, "inspect interface")?;
        if parse_mtu(&link.stdout) != Some(attachment.mtu) {
            self.runner
                .run(&Self::in_namespace(ns).args([
                    "link",
                    "set",
                    "dev",
                    ifname,
                    "mtu",
                    &attachment.mtu.to_string(),
                ]))
                .await?
                .check(TOOL, "set interface mtu")?;
        }

        let addrs = self
            .runner
            .run(&Self::in_namespace(ns).args(["-o", "addr", "show", "dev", ifname]))
            .await?
            .check(TOOL, "inspect addresses")?;
        if has_address(&addrs.stdout, &attachment.ip_cidr) {
            debug!("{} already has {} in {}", ifname, attachment.ip_cidr, ns);
        } else {
            self.runner
                .run(&Self::in_namespace(ns).args([
                    "addr",
                    "add",
                    &attachment.ip_cidr,
                    "dev",
                    ifname,
                ]))
                .await?
                .check(TOOL, "add address")?;
        }

        self.runner
            .run(&Self::in_namespace(ns).args(["link", "set", ifname, "up"]))
            .await?
            .check(TOOL, "bring interface up")?;

        if let Some(gateway) = attachment.gateway.as_deref() {
            let routes = self
                .runner
                .run(&Self::in_namespace(ns).args(["route", "show", "default"]))
                .await?;
            if routes.success() && routes.stdout.contains(&format!("via {} ", gateway)) {
                debug!("Default route via {} already present in {}", gateway, ns);
            } else {
                // A stale default route may or may not exist
                self.runner
                    .run(&Self::in_namespace(ns).args(["route", "del", "default"]))
                    .await?;
                self.runner
                    .run(&Self::in_namespace(ns).args(["route", "add", "default", "via", gateway]))
                    .await?
                    .check(TOOL, "add default route")?;
            }
        }

        Ok(())
    }
}

/// MTU from `ip -o link show` output
fn parse_mtu(output: &str) -> Option<u32> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "mtu" {
            return tokens.next().and_then(|v| v.parse().ok());
        }
    }
    None
}

/// Whether `ip -o addr show` output carries exactly this address
fn has_address(output: &str, ip_cidr: &str) -> bool {
    output.lines().any(|line| {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "inet" {
                return tokens.next() == Some(ip_cidr);
            }
        }
        false
    })
}

#[async_trait]
impl NetworkManager for IpNetnsManager {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Self::ip().args(["netns", "list"]))
            .await?
            .check(TOOL, "list namespaces")?;

        // Lines look like `tenantA (id: 3)`
        Ok(out
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .any(|ns| ns == name))
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        if self.namespace_exists(name).await? {
            debug!("Namespace {} already exists", name);
            return Ok(());
        }

        self.runner
            .run(&Self::ip().args(["netns", "add", name]))
            .await?
            .check(TOOL, "create namespace")?;
        info!("Created network namespace {}", name);
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        if !self.namespace_exists(name).await? {
            debug!("Namespace {} not present, nothing to delete", name);
            return Ok(());
        }

        self.runner
            .run(&Self::ip().args(["netns", "del", name]))
            .await?
            .check(TOOL, "delete namespace")?;
        info!("Deleted network namespace {}", name);
        Ok(())
    }

    async fn link_exists(&self, ifname: &str) -> Result<bool> {
        let out = self.runner.run(&Self::ip().args(["link", "show", ifname])).await?;
        Ok(out.success())
    }

    async fn attach_vlan(&self, attachment: &VlanAttachment) -> Result<()> {
        let ifname = attachment.interface_name();
        let ns = attachment.namespace.as_str();

        if self.link_in_namespace(ns, &ifname).await? {
            debug!("{} already inside namespace {}", ifname, ns);
        } else if self.link_exists(&ifname).await? {
            debug!("{} found in root namespace, moving into {}", ifname, ns);
            self.move_into(ns, &ifname).await?;
        } else {
            self.runner
                .run(&Self::ip().args([
                    "link",
                    "add",
                    "link",
                    &attachment.parent_if,
                    "name",
                    &ifname,
                    "type",
                    "vlan",
                    "id",
                    &attachment.vlan_id.to_string(),
                ]))
                .await?
                .check(TOOL, "create vlan interface")?;
            self.move_into(ns, &ifname).await?;
            info!(
                "Created VLAN {} on {} as {} in {}",
                attachment.vlan_id, attachment.parent_if, ifname, ns
            );
        }

        self.configure(attachment, &ifname).await
    }
}
