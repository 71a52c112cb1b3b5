//! Lifecycle Plans
//!
//! Every multi-step operation is an explicit, ordered list of named steps,
//! each classified by how safe it is to repeat. The orchestrator runs the
//! steps through a [`Progress`] tracker, which logs them and turns a
//! failure after the first completed step into [`Error::StepFailed`], so
//! callers learn exactly how far a sequence got.

use crate::error::{Error, Result};
use std::future::Future;
use tracing::{debug, info, warn};

// =============================================================================
// Steps
// =============================================================================

/// How a step behaves when repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Re-checks external state first; repeating it is a no-op
    Idempotent,
    /// Failure is logged and the sequence continues
    Tolerant,
    /// Must not be repeated blindly; a second run fails with a conflict
    NonIdempotent,
}

/// A named unit of work inside a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub idempotency: Idempotency,
}

impl Step {
    const fn idempotent(name: &'static str) -> Self {
        Self {
            name,
            idempotency: Idempotency::Idempotent,
        }
    }

    const fn tolerant(name: &'static str) -> Self {
        Self {
            name,
            idempotency: Idempotency::Tolerant,
        }
    }

    const fn non_idempotent(name: &'static str) -> Self {
        Self {
            name,
            idempotency: Idempotency::NonIdempotent,
        }
    }
}

pub mod steps {
    use super::Step;

    // Network
    pub const CREATE_NAMESPACE: Step = Step::idempotent("create_namespace");
    pub const ALLOCATE_INTERFACE: Step = Step::idempotent("allocate_interface");
    pub const ATTACH_VLAN: Step = Step::idempotent("attach_vlan");
    pub const DELETE_NAMESPACE: Step = Step::idempotent("delete_namespace");

    // Cluster & service
    pub const CREATE_CLUSTER_GROUP: Step = Step::idempotent("create_cluster_group");
    pub const DELETE_CLUSTER_GROUP: Step = Step::idempotent("delete_cluster_group");
    pub const STOP_EXPORT_SERVICE: Step = Step::tolerant("stop_export_service");

    // Volumes
    pub const CREATE_ROOT_VOLUME: Step = Step::idempotent("create_root_volume");
    pub const FORMAT_ROOT_VOLUME: Step = Step::idempotent("format_root_volume");
    pub const CREATE_LOGICAL_VOLUME: Step = Step::non_idempotent("create_logical_volume");
    pub const FORMAT_FILESYSTEM: Step = Step::idempotent("format_filesystem");
    pub const MOUNT_FILESYSTEM: Step = Step::idempotent("mount_filesystem");
    pub const EXTEND_LOGICAL_VOLUME: Step = Step::non_idempotent("extend_logical_volume");
    pub const GROW_FILESYSTEM: Step = Step::idempotent("grow_filesystem");
    pub const UNMOUNT_FILESYSTEM: Step = Step::idempotent("unmount_filesystem");
    pub const DELETE_LOGICAL_VOLUME: Step = Step::idempotent("delete_logical_volume");
    pub const DELETE_VOLUMES: Step = Step::idempotent("delete_volumes");

    // Snapshots
    pub const CREATE_SNAPSHOT: Step = Step::non_idempotent("create_snapshot");
    pub const DELETE_SNAPSHOTS: Step = Step::idempotent("delete_snapshots");
    pub const CLONE_SNAPSHOT: Step = Step::non_idempotent("clone_snapshot");

    // Exports
    pub const RENDER_EXPORTS: Step = Step::idempotent("render_exports");
    pub const ADD_EXPORT_RULE: Step = Step::non_idempotent("add_export_rule");
    pub const REMOVE_EXPORT_RULE: Step = Step::non_idempotent("remove_export_rule");
    pub const REMOVE_EXPORTS: Step = Step::idempotent("remove_exports");
    pub const REMOVE_EXPORT_STATE: Step = Step::idempotent("remove_export_state");

    // State store
    pub const RECORD: Step = Step::idempotent("record");
    pub const DELETE_RECORD: Step = Step::idempotent("delete_record");
}

use steps::*;

// =============================================================================
// Plans
// =============================================================================

/// Ordered steps of one operation
#[derive(Debug)]
pub struct Plan {
    pub operation: &'static str,
    pub steps: &'static [Step],
}

impl Plan {
    /// Whether the whole plan can be re-run from the top after a failure
    pub fn is_retry_safe(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.idempotency != Idempotency::NonIdempotent)
    }

    pub fn position(&self, step: &Step) -> Option<usize> {
        self.steps.iter().position(|s| s == step)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }
}

pub const SVM_CREATE: Plan = Plan {
    operation: "svm.create",
    steps: &[
        CREATE_NAMESPACE,
        ALLOCATE_INTERFACE,
        ATTACH_VLAN,
        RENDER_EXPORTS,
        CREATE_ROOT_VOLUME,
        FORMAT_ROOT_VOLUME,
        CREATE_CLUSTER_GROUP,
        RECORD,
    ],
};

pub const SVM_DELETE: Plan = Plan {
    operation: "svm.delete",
    steps: &[
        DELETE_VOLUMES,
        DELETE_CLUSTER_GROUP,
        STOP_EXPORT_SERVICE,
        DELETE_NAMESPACE,
        REMOVE_EXPORT_STATE,
        DELETE_RECORD,
    ],
};

pub const VOLUME_CREATE: Plan = Plan {
    operation: "volume.create",
    steps: &[
        CREATE_LOGICAL_VOLUME,
        FORMAT_FILESYSTEM,
        MOUNT_FILESYSTEM,
        RECORD,
    ],
};

pub const VOLUME_RESIZE: Plan = Plan {
    operation: "volume.resize",
    steps: &[EXTEND_LOGICAL_VOLUME, GROW_FILESYSTEM, RECORD],
};

pub const VOLUME_DELETE: Plan = Plan {
    operation: "volume.delete",
    steps: &[
        REMOVE_EXPORTS,
        DELETE_SNAPSHOTS,
        UNMOUNT_FILESYSTEM,
        DELETE_LOGICAL_VOLUME,
        DELETE_RECORD,
    ],
};

pub const VOLUME_CLONE: Plan = Plan {
    operation: "volume.clone",
    steps: &[
        CLONE_SNAPSHOT,
        MOUNT_FILESYSTEM,
        EXTEND_LOGICAL_VOLUME,
        GROW_FILESYSTEM,
        RECORD,
    ],
};

pub const SNAPSHOT_CREATE: Plan = Plan {
    operation: "snapshot.create",
    steps: &[CREATE_SNAPSHOT, RECORD],
};

pub const SNAPSHOT_DELETE: Plan = Plan {
    operation: "snapshot.delete",
    steps: &[DELETE_LOGICAL_VOLUME, DELETE_RECORD],
};

pub const EXPORT_ADD: Plan = Plan {
    operation: "export.add",
    steps: &[ADD_EXPORT_RULE],
};

pub const EXPORT_REMOVE: Plan = Plan {
    operation: "export.remove",
    steps: &[REMOVE_EXPORT_RULE],
};

// =============================================================================
// Progress Tracking
// =============================================================================

/// Runs the steps of one plan and remembers which completed
pub struct Progress {
    plan: &'static Plan,
    target: String,
    completed: Vec<&'static str>,
}

impl Progress {
    pub fn start(plan: &'static Plan, target: impl Into<String>) -> Self {
        let target = target.into();
        info!("{} {}: starting", plan.operation, target);
        Self {
            plan,
            target,
            completed: Vec::new(),
        }
    }

    /// Completed step names, in order
    pub fn completed(&self) -> &[&'static str] {
        &self.completed
    }

    fn fail(&self, step: &Step, err: Error) -> Error {
        if self.completed.is_empty() {
            return err;
        }
        Error::StepFailed {
            operation: self.plan.operation.to_string(),
            step: step.name.to_string(),
            completed: self.completed.iter().map(|s| s.to_string()).collect(),
            source: Box::new(err),
        }
    }

    /// Run one step
    pub async fn step<T, F>(&mut self, step: &Step, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        debug_assert!(
            self.plan.position(step).is_some(),
            "step {} is not part of {}",
            step.name,
            self.plan.operation
        );
        debug!("{} {}: {}", self.plan.operation, self.target, step.name);

        match work.await {
            Ok(value) => {
                self.completed.push(step.name);
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "{} {}: step {} failed: {}",
                    self.plan.operation, self.target, step.name, err
                );
                Err(self.fail(step, err))
            }
        }
    }

    /// Run a tolerant step; its failure is logged and swallowed
    pub async fn tolerate<F>(&mut self, step: &Step, work: F)
    where
        F: Future<Output = Result<()>>,
    {
        debug_assert_eq!(step.idempotency, Idempotency::Tolerant);
        match work.await {
            Ok(()) => self.completed.push(step.name),
            Err(err) => warn!(
                "{} {}: ignoring failure of {}: {}",
                self.plan.operation, self.target, step.name, err
            ),
        }
    }

    /// Record that an optional step does not apply
    pub fn skip(&self, step: &Step, reason: &str) {
        debug!(
            "{} {}: skipping {} ({})",
            self.plan.operation, self.target, step.name, reason
        );
    }

    pub fn finish(self) {
        info!(
            "{} {}: done ({})",
            self.plan.operation,
            self.target,
            self.completed.join(" -> ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;

    const ALL_PLANS: &[&Plan] = &[
        &SVM_CREATE,
        &SVM_DELETE,
        &VOLUME_CREATE,
        &VOLUME_RESIZE,
        &VOLUME_DELETE,
        &VOLUME_CLONE,
        &SNAPSHOT_CREATE,
        &SNAPSHOT_DELETE,
        &EXPORT_ADD,
        &EXPORT_REMOVE,
    ];

    #[test]
    fn test_plans_have_unique_steps() {
        for plan in ALL_PLANS {
            let names: BTreeSet<_> = plan.steps.iter().map(|s| s.name).collect();
            assert_eq!(names.len(), plan.steps.len(), "{}", plan.operation);
        }
    }

    #[test]
    fn test_volume_ordering() {
        let create = |s: &Step| VOLUME_CREATE.position(s).unwrap();
        assert!(create(&CREATE_LOGICAL_VOLUME) < create(&FORMAT_FILESYSTEM));
        assert!(create(&FORMAT_FILESYSTEM) < create(&MOUNT_FILESYSTEM));
        assert!(create(&MOUNT_FILESYSTEM) < create(&RECORD));

        let delete = |s: &Step| VOLUME_DELETE.position(s).unwrap();
        assert!(delete(&UNMOUNT_FILESYSTEM) < delete(&DELETE_LOGICAL_VOLUME));

        // Clones inherit their filesystem
        assert!(VOLUME_CLONE.position(&FORMAT_FILESYSTEM).is_none());
    }

    #[test]
    fn test_svm_ordering() {
        let create = |s: &Step| SVM_CREATE.position(s).unwrap();
        assert!(create(&CREATE_NAMESPACE) < create(&ATTACH_VLAN));
        assert!(create(&ATTACH_VLAN) < create(&RENDER_EXPORTS));
        assert!(create(&CREATE_ROOT_VOLUME) < create(&CREATE_CLUSTER_GROUP));
        assert_eq!(SVM_CREATE.step_names().last(), Some(&"record"));

        let delete = |s: &Step| SVM_DELETE.position(s).unwrap();
        assert!(delete(&DELETE_CLUSTER_GROUP) < delete(&STOP_EXPORT_SERVICE));
        assert!(delete(&STOP_EXPORT_SERVICE) < delete(&DELETE_NAMESPACE));
    }

    #[test]
    fn test_retry_safety() {
        assert!(SVM_CREATE.is_retry_safe());
        assert!(SVM_DELETE.is_retry_safe());
        assert!(!VOLUME_CREATE.is_retry_safe());
        assert!(!VOLUME_CLONE.is_retry_safe());
    }

    #[tokio::test]
    async fn test_first_step_failure_is_unwrapped() {
        let mut progress = Progress::start(&VOLUME_CREATE, "tenantA/vol1");
        let err = progress
            .step(&CREATE_LOGICAL_VOLUME, async {
                Err::<(), _>(Error::exists("LogicalVolume", "/dev/vg/vol"))
            })
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });
    }

    #[tokio::test]
    async fn test_later_failure_reports_progress() {
        let mut progress = Progress::start(&VOLUME_CREATE, "tenantA/vol1");
        let device = progress
            .step(&CREATE_LOGICAL_VOLUME, async { Ok("/dev/vg/vol".to_string()) })
            .await
            .unwrap();
        assert_eq!(device, "/dev/vg/vol");

        let err = progress
            .step(&FORMAT_FILESYSTEM, async {
                Err::<(), _>(Error::command_failed("xfs", "format device", "busy"))
            })
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            Error::StepFailed { operation, step, completed, .. }
                if operation == "volume.create"
                    && step == "format_filesystem"
                    && completed == &vec!["create_logical_volume".to_string()]
        );
        assert_matches!(err.root_cause(), Error::CommandFailed { .. });
    }

    #[tokio::test]
    async fn test_tolerated_failure_continues() {
        let mut progress = Progress::start(&SVM_DELETE, "tenantA");
        progress.step(&DELETE_VOLUMES, async { Ok(()) }).await.unwrap();
        progress
            .tolerate(&STOP_EXPORT_SERVICE, async {
                Err(Error::command_failed("systemctl", "stop", "failed"))
            })
            .await;
        progress.step(&DELETE_NAMESPACE, async { Ok(()) }).await.unwrap();

        assert_eq!(progress.completed(), &["delete_volumes", "delete_namespace"]);
    }
}
