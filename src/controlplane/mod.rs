//! Control Plane
//!
//! The orchestration core: subsystem adapters, the export configuration
//! engine, lifecycle plans and the orchestrator that sequences them.

pub mod backends;
pub mod exports;
pub mod lifecycle;
pub mod orchestrator;

pub use backends::Backends;
pub use exports::{ConfigMeta, ConfigSnapshotInfo, ExportConfigEngine, RenderOutcome};
pub use lifecycle::{Idempotency, Plan, Progress, Step};
pub use orchestrator::Orchestrator;
