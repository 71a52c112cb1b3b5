//! Operation Requests
//!
//! Input types accepted by the orchestration engine. Front ends build
//! these from their own argument parsing; the engine validates them
//! before any external call.

use serde::{Deserialize, Serialize};

fn default_mtu() -> u32 {
    1500
}

fn default_true() -> bool {
    true
}

fn default_fs_type() -> String {
    "xfs".to_string()
}

fn default_access() -> String {
    "rw".to_string()
}

fn default_sec() -> Vec<String> {
    vec!["sys".to_string()]
}

/// Request to create an SVM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSvmRequest {
    pub name: String,
    pub vlan_id: u16,
    /// Interface address with prefix, e.g. `192.168.10.5/24`
    pub ip_cidr: String,
    /// Inferred from `ip_cidr` when absent
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// Creates `/dev/<vg>/vol_<svm>` for the cluster Filesystem resource
    #[serde(default)]
    pub root_volume_size_gib: Option<u64>,
}

impl CreateSvmRequest {
    pub fn new(name: impl Into<String>, vlan_id: u16, ip_cidr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vlan_id,
            ip_cidr: ip_cidr.into(),
            gateway: None,
            mtu: default_mtu(),
            root_volume_size_gib: None,
        }
    }
}

/// Request to create a volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub svm: String,
    pub name: String,
    pub size_gib: u64,
    #[serde(default = "default_true")]
    pub thin: bool,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
}

impl CreateVolumeRequest {
    pub fn new(svm: impl Into<String>, name: impl Into<String>, size_gib: u64) -> Self {
        Self {
            svm: svm.into(),
            name: name.into(),
            size_gib,
            thin: true,
            fs_type: default_fs_type(),
        }
    }
}

/// Request to add an NFS export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExportRequest {
    pub svm: String,
    pub volume: String,
    /// Client network in CIDR form
    pub client: String,
    /// `rw` or `ro`
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default = "default_true")]
    pub root_squash: bool,
    #[serde(default = "default_sec")]
    pub sec: Vec<String>,
}

impl AddExportRequest {
    pub fn new(svm: impl Into<String>, volume: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            svm: svm.into(),
            volume: volume.into(),
            client: client.into(),
            access: default_access(),
            root_squash: true,
            sec: default_sec(),
        }
    }
}

/// Request to snapshot a volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub svm: String,
    pub volume: String,
    pub name: String,
}

/// Request to clone a new volume from a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneVolumeRequest {
    pub svm: String,
    /// Name of the new volume
    pub name: String,
    pub snapshot: String,
    /// Source volume of the snapshot; required when the snapshot name is ambiguous
    #[serde(default)]
    pub source_volume: Option<String>,
    /// Grow the clone beyond the source size
    #[serde(default)]
    pub size_gib: Option<u64>,
}
