//! Domain Ports - Collaborator trait definitions
//!
//! These traits define the boundaries between the orchestration engine and
//! the external subsystems it drives. Each subsystem gets one narrow trait
//! so it can be replaced by a fake in tests without touching global state.

use crate::error::Result;
use crate::exec::{CommandOutput, Invocation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Process Execution & Clock
// =============================================================================

/// Port for running external programs
///
/// A non-zero exit is not an error at this level; adapters inspect
/// [`CommandOutput`] and decide.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Port for timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Network Identity Port
// =============================================================================

/// Parameters for placing a VLAN sub-interface inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanAttachment {
    pub namespace: String,
    pub parent_if: String,
    pub vlan_id: u16,
    /// Address with prefix, e.g. `10.0.0.5/24`
    pub ip_cidr: String,
    pub gateway: Option<String>,
    pub mtu: u32,
    /// Interface name; `<parent_if>.<vlan_id>` when absent
    pub ifname: Option<String>,
}

impl VlanAttachment {
    pub fn interface_name(&self) -> String {
        self.ifname
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.parent_if, self.vlan_id))
    }
}

/// Port for namespace and VLAN management
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Check whether a network namespace exists
    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    /// Create a namespace; no-op when present
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Delete a namespace and every interface inside it; no-op when absent
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Check whether an interface exists in the root namespace
    async fn link_exists(&self, ifname: &str) -> Result<bool>;

    /// Create or reuse a VLAN interface, move it into the namespace and configure it
    async fn attach_vlan(&self, attachment: &VlanAttachment) -> Result<()>;
}

// =============================================================================
// Volume Port
// =============================================================================

/// Logical volume to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvSpec {
    pub vg_name: String,
    pub lv_name: String,
    pub size_gib: u64,
    /// Thin pool to allocate from; thick when absent
    pub thinpool: Option<String>,
}

/// Port for logical volume management
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// Check whether a logical volume exists
    async fn exists(&self, vg_name: &str, lv_name: &str) -> Result<bool>;

    /// Create a logical volume and return its device path
    ///
    /// Fails with a conflict when the volume already exists.
    async fn create(&self, spec: &LvSpec) -> Result<String>;

    /// Extend an existing logical volume
    async fn resize(&self, vg_name: &str, lv_name: &str, new_size_gib: u64) -> Result<()>;

    /// Remove a logical volume; no-op when absent
    async fn delete(&self, vg_name: &str, lv_name: &str) -> Result<()>;

    /// Take a thin snapshot of `source_lv` and return its device path
    async fn snapshot(&self, vg_name: &str, source_lv: &str, snap_lv: &str) -> Result<String>;

    /// Create a writable, activatable clone of a snapshot
    ///
    /// The clone inherits the snapshot's filesystem and must never be formatted.
    async fn clone_from_snapshot(
        &self,
        vg_name: &str,
        snap_lv: &str,
        clone_lv: &str,
    ) -> Result<String>;
}

// =============================================================================
// Filesystem Port
// =============================================================================

/// How a device is being mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// A freshly formatted device with its own filesystem UUID
    Fresh,
    /// A snapshot clone that shares its origin's filesystem UUID
    Clone,
}

/// Port for formatting, mounting and growing filesystems
#[async_trait]
pub trait FilesystemManager: Send + Sync {
    /// Format a device; skipped when a matching signature is present
    async fn format(&self, device: &str) -> Result<()>;

    /// Check whether a path is an active mount point
    async fn is_mounted(&self, mount_point: &str) -> Result<bool>;

    /// Mount a device; no-op when already mounted
    async fn mount(&self, device: &str, mount_point: &str, kind: MountKind) -> Result<()>;

    /// Unmount a path; no-op when not mounted
    async fn unmount(&self, mount_point: &str) -> Result<()>;

    /// Grow a mounted filesystem to fill its device
    async fn grow(&self, mount_point: &str) -> Result<()>;
}

// =============================================================================
// Cluster Port
// =============================================================================

/// Everything needed to build an SVM's cluster resource group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvmGroupSpec {
    pub svm: String,
    /// Root volume mount point used by the Filesystem resource
    pub mount_path: String,
    pub vlan_id: u16,
    pub ifname: Option<String>,
    pub ip: String,
    pub prefix: u8,
    pub gateway: Option<String>,
    pub mtu: u32,
    pub parent_if: String,
    pub vg_name: String,
    pub drbd_resource: String,
    pub ra_vendor: String,
    /// Only when a root volume was requested
    pub create_filesystem: bool,
}

impl SvmGroupSpec {
    pub fn group_name(&self) -> String {
        format!("g_svm_{}", self.svm)
    }
}

/// Port for the cluster resource manager
#[async_trait]
pub trait ClusterCoordinator: Send + Sync {
    /// Check whether the SVM's resource group exists
    async fn group_exists(&self, svm: &str) -> Result<bool>;

    /// Ensure the replicated block device, the SVM group and its constraints exist
    async fn create_svm_group(&self, spec: &SvmGroupSpec) -> Result<()>;

    /// Disable and remove the SVM group; the shared block device is left alone
    async fn delete_svm_group(&self, svm: &str) -> Result<()>;
}

// =============================================================================
// Export Service Port
// =============================================================================

/// Port for the service manager running per-SVM export daemons
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn start(&self, unit: &str) -> Result<()>;

    /// Stop a unit; a unit that is not loaded counts as stopped
    async fn stop(&self, unit: &str) -> Result<()>;

    async fn reload(&self, unit: &str) -> Result<()>;

    async fn is_active(&self, unit: &str) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type CommandRunnerRef = Arc<dyn CommandRunner>;
pub type ClockRef = Arc<dyn Clock>;
pub type NetworkManagerRef = Arc<dyn NetworkManager>;
pub type VolumeManagerRef = Arc<dyn VolumeManager>;
pub type FilesystemManagerRef = Arc<dyn FilesystemManager>;
pub type ClusterCoordinatorRef = Arc<dyn ClusterCoordinator>;
pub type ServiceManagerRef = Arc<dyn ServiceManager>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlan_interface_name() {
        let mut attachment = VlanAttachment {
            namespace: "tenantA".into(),
            parent_if: "bond0".into(),
            vlan_id: 100,
            ip_cidr: "10.0.0.5/24".into(),
            gateway: None,
            mtu: 1500,
            ifname: None,
        };
        assert_eq!(attachment.interface_name(), "bond0.100");

        attachment.ifname = Some("v100-tenantaXy".into());
        assert_eq!(attachment.interface_name(), "v100-tenantaXy");
    }
}
