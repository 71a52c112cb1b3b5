//! Arca Storage - Resource Orchestration Engine
//!
//! Turns tenant-level storage intents ("create an SVM on VLAN 100",
//! "export volume vol1 to 10.0.1.0/24") into ordered, idempotent sequences
//! of operations against the host subsystems of a two-node HA NFS
//! appliance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                                 │
//! │      SVM / volume / snapshot / export lifecycles (Plans + Steps)     │
//! ├──────────────────────┬──────────────────────┬───────────────────────┤
//! │     State Store      │   Export Config      │      Validation       │
//! │  (atomic JSON files) │  Engine (Ganesha)    │   & Interface Naming  │
//! ├──────────────────────┴──────────────────────┴───────────────────────┤
//! │                        Subsystem Adapters                            │
//! │   netns/VLAN  │  LVM thin  │  XFS  │  Pacemaker (pcs)  │  systemd    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                  Command Runner (argv, no shell)                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Orchestrator, lifecycle plans, adapters and the export engine
//! - [`state`]: File-backed record store with atomic replace
//! - [`domain`]: Records, requests and port traits
//! - [`config`]: Bootstrap/runtime configuration
//! - [`error`]: Error types and classification

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod exec;
pub mod naming;
pub mod state;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::ArcaConfig;

pub use controlplane::{Backends, ExportConfigEngine, Orchestrator, RenderOutcome};

pub use domain::records::{
    Access, ExportEntry, ExportRule, SnapshotRecord, Squash, SvmRecord, VolumeRecord,
};

pub use domain::requests::{
    AddExportRequest, CloneVolumeRequest, CreateSnapshotRequest, CreateSvmRequest,
    CreateVolumeRequest,
};

pub use error::{Error, ErrorClass, Result};

pub use state::StateStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
