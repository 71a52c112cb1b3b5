//! Subsystem Adapters
//!
//! One adapter per external subsystem, each a thin layer over its command
//! line tool:
//! - netns: network namespaces and VLAN interfaces (`ip`)
//! - lvm: logical volumes, snapshots and clones
//! - xfs: format, mount, grow
//! - pacemaker: per-SVM cluster resource groups (`pcs`)
//! - systemd: the per-SVM export service

pub mod lvm;
pub mod netns;
pub mod pacemaker;
pub mod systemd;
pub mod xfs;

pub use lvm::LvmManager;
pub use netns::IpNetnsManager;
pub use pacemaker::PacemakerCoordinator;
pub use systemd::SystemdServiceManager;
pub use xfs::XfsManager;

use crate::domain::ports::{
    ClusterCoordinatorRef, CommandRunnerRef, FilesystemManagerRef, NetworkManagerRef,
    ServiceManagerRef, VolumeManagerRef,
};
use std::sync::Arc;

/// The full set of subsystem collaborators the orchestrator drives
#[derive(Clone)]
pub struct Backends {
    pub network: NetworkManagerRef,
    pub volumes: VolumeManagerRef,
    pub filesystems: FilesystemManagerRef,
    pub cluster: ClusterCoordinatorRef,
    pub services: ServiceManagerRef,
}

impl Backends {
    /// Real adapters sharing one command runner
    pub fn system(runner: CommandRunnerRef) -> Self {
        Self {
            network: Arc::new(IpNetnsManager::new(runner.clone())),
            volumes: Arc::new(LvmManager::new(runner.clone())),
            filesystems: Arc::new(XfsManager::new(runner.clone())),
            cluster: Arc::new(PacemakerCoordinator::new(runner.clone())),
            services: Arc::new(SystemdServiceManager::new(runner)),
        }
    }
}
