//! Persisted Entities
//!
//! Concrete record types for every document the state store holds. Each
//! record is replaced whole on update; there are no partial-field writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Status Enums
// =============================================================================

/// Lifecycle status of an SVM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvmStatus {
    Creating,
    Available,
    Deleting,
    Error,
}

/// Lifecycle status of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Creating,
    Available,
    Resizing,
    Deleting,
    Error,
}

/// Lifecycle status of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Creating,
    Available,
    Deleting,
    Error,
}

impl std::fmt::Display for SvmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SvmStatus::Creating => write!(f, "creating"),
            SvmStatus::Available => write!(f, "available"),
            SvmStatus::Deleting => write!(f, "deleting"),
            SvmStatus::Error => write!(f, "error"),
        }
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeStatus::Creating => write!(f, "creating"),
            VolumeStatus::Available => write!(f, "available"),
            VolumeStatus::Resizing => write!(f, "resizing"),
            VolumeStatus::Deleting => write!(f, "deleting"),
            VolumeStatus::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A key in the state store, ordered so collections sort deterministically
pub trait Record: Clone + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    type Key: Ord + Clone + std::fmt::Debug + Send;

    /// Collection file stem (`svms`, `volumes`, `snapshots`)
    const COLLECTION: &'static str;

    fn key(&self) -> Self::Key;
}

/// Storage Virtual Machine: a tenant's network and export identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmRecord {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub gateway: Option<String>,
    pub mtu: u32,
    /// Network namespace, always equal to `name`
    pub namespace: String,
    /// Service address without prefix length
    pub vip: String,
    /// VLAN interface allocated inside the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifname: Option<String>,
    /// Size of the root volume backing the cluster Filesystem resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_volume_size_gib: Option<u64>,
    pub status: SvmStatus,
    pub created_at: DateTime<Utc>,
}

impl SvmRecord {
    /// Cluster resource group managing this SVM
    pub fn group_name(&self) -> String {
        format!("g_svm_{}", self.name)
    }
}

impl Record for SvmRecord {
    type Key = String;
    const COLLECTION: &'static str = "svms";

    fn key(&self) -> String {
        self.name.clone()
    }
}

/// A thin or thick volume mounted under its SVM's export root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,
    pub svm: String,
    pub size_gib: u64,
    pub thin: bool,
    pub fs_type: String,
    pub mount_path: String,
    pub lv_path: String,
    pub lv_name: String,
    /// Snapshot this volume was cloned from, as `<volume>@<snapshot>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloned_from: Option<String>,
    pub status: VolumeStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for VolumeRecord {
    type Key = (String, String);
    const COLLECTION: &'static str = "volumes";

    fn key(&self) -> (String, String) {
        (self.svm.clone(), self.name.clone())
    }
}

/// A point-in-time thin snapshot of a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,
    pub svm: String,
    pub volume: String,
    pub lv_path: String,
    pub lv_name: String,
    pub status: SnapshotStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for SnapshotRecord {
    type Key = (String, String, String);
    const COLLECTION: &'static str = "snapshots";

    fn key(&self) -> (String, String, String) {
        (self.svm.clone(), self.volume.clone(), self.name.clone())
    }
}

// =============================================================================
// Export Rules
// =============================================================================

/// NFS access type of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "RO")]
    ReadOnly,
}

impl Access {
    /// Parse the user-facing `rw`/`ro` form
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rw" => Some(Access::ReadWrite),
            "ro" => Some(Access::ReadOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::ReadWrite => write!(f, "RW"),
            Access::ReadOnly => write!(f, "RO"),
        }
    }
}

/// Root squash policy of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Squash {
    #[serde(rename = "Root_Squash")]
    RootSquash,
    #[serde(rename = "No_Root_Squash")]
    NoRootSquash,
}

impl Squash {
    pub fn from_root_squash(root_squash: bool) -> Self {
        if root_squash {
            Squash::RootSquash
        } else {
            Squash::NoRootSquash
        }
    }
}

impl std::fmt::Display for Squash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Squash::RootSquash => write!(f, "Root_Squash"),
            Squash::NoRootSquash => write!(f, "No_Root_Squash"),
        }
    }
}

/// One NFS export rule, stored in the per-SVM export list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRule {
    /// Assigned as `max(existing) + 1`, never reused
    pub export_id: u32,
    pub path: String,
    pub pseudo: String,
    pub access: Access,
    pub squash: Squash,
    pub sec: Vec<String>,
    pub client: String,
}

impl ExportRule {
    /// Volume name, the last component of the export path
    pub fn volume(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// An export rule annotated with its owning SVM and volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub svm: String,
    pub volume: String,
    #[serde(flatten)]
    pub rule: ExportRule,
}

// =============================================================================
// Derived Names
// =============================================================================

/// Logical volume name of a volume
pub fn volume_lv_name(svm: &str, volume: &str) -> String {
    format!("vol_{}_{}", svm, volume)
}

/// Logical volume name of a snapshot
pub fn snapshot_lv_name(svm: &str, volume: &str, snapshot: &str) -> String {
    format!("vol_{}_{}_snap_{}", svm, volume, snapshot)
}

/// Logical volume name of an SVM's root volume
pub fn root_lv_name(svm: &str) -> String {
    format!("vol_{}", svm)
}

/// systemd unit serving an SVM's exports
pub fn export_unit(svm: &str) -> String {
    format!("nfs-ganesha@{}", svm)
}
