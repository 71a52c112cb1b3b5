//! Export Configuration
//!
//! Rendering of per-SVM NFS-Ganesha documents and the engine managing
//! export lists, versioned snapshots and rollback.

pub mod engine;
pub mod render;

pub use engine::{ConfigSnapshotInfo, ExportConfigEngine, NewExport, RenderOutcome, LATEST};
pub use render::{ConfigMeta, RenderedConfig, TEMPLATE_VERSION};
