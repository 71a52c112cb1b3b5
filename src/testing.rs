//! In-memory fakes of every collaborator port
//!
//! All fakes append to a shared [`EventLog`] so tests can assert the exact
//! order of side effects across subsystems, and can inject a failure for
//! any named operation.

use crate::domain::ports::{
    Clock, ClusterCoordinator, CommandRunner, FilesystemManager, LvSpec, MountKind,
    NetworkManager, ServiceManager, SvmGroupSpec, VlanAttachment, VolumeManager,
};
use crate::error::{Error, Result};
use crate::exec::{CommandOutput, Invocation};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Command Runner
// =============================================================================

type Handler = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

/// Records every invocation and answers through a handler closure
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    handler: Handler,
}

impl FakeRunner {
    pub fn new(handler: impl Fn(&[String]) -> CommandOutput + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    /// Every command exits 0 with empty output
    pub fn succeeding() -> Arc<Self> {
        Self::new(|_| CommandOutput::ok(""))
    }

    /// Invocations so far, each joined with spaces
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|argv| argv.join(" ")).collect()
    }

    /// Invocations whose command line starts with `prefix`
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let argv = invocation.argv();
        self.calls.lock().push(argv.clone());
        Ok((self.handler)(&argv))
    }
}

// =============================================================================
// Shared Event Log
// =============================================================================

/// Ordered record of side effects plus failure injection
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<BTreeSet<String>>>,
}

impl EventLog {
    /// Record `op detail`, failing when `op` was marked with [`EventLog::fail_on`]
    fn record(&self, op: &str, detail: &str) -> Result<()> {
        self.events.lock().push(format!("{} {}", op, detail));
        if self.failures.lock().contains(op) {
            return Err(Error::command_failed(op, "run", "injected failure"));
        }
        Ok(())
    }

    /// Make every later call of `op` fail
    pub fn fail_on(&self, op: &str) {
        self.failures.lock().insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Event operation names in order (`lvm.create`, `xfs.mount`, ...)
    pub fn ops(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| o.as_str() == op).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

// =============================================================================
// Network
// =============================================================================

#[derive(Default)]
pub struct FakeNetwork {
    pub log: EventLog,
    namespaces: Mutex<BTreeSet<String>>,
    root_links: Mutex<BTreeSet<String>>,
    attached: Mutex<BTreeMap<String, VlanAttachment>>,
    all_links_taken: AtomicBool,
}

impl FakeNetwork {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn add_root_link(&self, ifname: &str) {
        self.root_links.lock().insert(ifname.to_string());
    }

    pub fn set_all_links_taken(&self, taken: bool) {
        self.all_links_taken.store(taken, Ordering::SeqCst);
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.lock().contains(name)
    }

    pub fn attachment(&self, namespace: &str) -> Option<VlanAttachment> {
        self.attached.lock().get(namespace).cloned()
    }
}

#[async_trait]
impl NetworkManager for FakeNetwork {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.has_namespace(name))
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.log.record("netns.create", name)?;
        self.namespaces.lock().insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.log.record("netns.delete", name)?;
        self.namespaces.lock().remove(name);
        self.attached.lock().remove(name);
        Ok(())
    }

    async fn link_exists(&self, ifname: &str) -> Result<bool> {
        Ok(self.all_links_taken.load(Ordering::SeqCst) || self.root_links.lock().contains(ifname))
    }

    async fn attach_vlan(&self, attachment: &VlanAttachment) -> Result<()> {
        self.log.record(
            "netns.attach",
            &format!("{} {}", attachment.namespace, attachment.interface_name()),
        )?;
        if !self.has_namespace(&attachment.namespace) {
            return Err(Error::not_found("Namespace", &attachment.namespace));
        }
        self.attached
            .lock()
            .insert(attachment.namespace.clone(), attachment.clone());
        Ok(())
    }
}

// =============================================================================
// Volumes
// =============================================================================

#[derive(Default)]
pub struct FakeVolumes {
    pub log: EventLog,
    lvs: Mutex<BTreeMap<String, u64>>,
}

impl FakeVolumes {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn contains(&self, lv_name: &str) -> bool {
        self.lvs.lock().contains_key(lv_name)
    }

    pub fn size_of(&self, lv_name: &str) -> Option<u64> {
        self.lvs.lock().get(lv_name).copied()
    }

    /// Pretend an LV already exists outside the engine's knowledge
    pub fn insert(&self, lv_name: &str, size_gib: u64) {
        self.lvs.lock().insert(lv_name.to_string(), size_gib);
    }
}

fn device(vg: &str, lv: &str) -> String {
    format!("/dev/{}/{}", vg, lv)
}

#[async_trait]
impl VolumeManager for FakeVolumes {
    async fn exists(&self, _vg_name: &str, lv_name: &str) -> Result<bool> {
        Ok(self.contains(lv_name))
    }

    async fn create(&self, spec: &LvSpec) -> Result<String> {
        self.log.record("lvm.create", &spec.lv_name)?;
        let path = device(&spec.vg_name, &spec.lv_name);
        if self.contains(&spec.lv_name) {
            return Err(Error::exists("LogicalVolume", path));
        }
        self.lvs.lock().insert(spec.lv_name.clone(), spec.size_gib);
        Ok(path)
    }

    async fn resize(&self, vg_name: &str, lv_name: &str, new_size_gib: u64) -> Result<()> {
        self.log.record("lvm.resize", &format!("{} {}", lv_name, new_size_gib))?;
        match self.lvs.lock().get_mut(lv_name) {
            Some(size) => {
                *size = new_size_gib;
                Ok(())
            }
            None => Err(Error::not_found("LogicalVolume", device(vg_name, lv_name))),
        }
    }

    async fn delete(&self, _vg_name: &str, lv_name: &str) -> Result<()> {
        self.log.record("lvm.delete", lv_name)?;
        self.lvs.lock().remove(lv_name);
        Ok(())
    }

    async fn snapshot(&self, vg_name: &str, source_lv: &str, snap_lv: &str) -> Result<String> {
        self.log.record("lvm.snapshot", &format!("{} {}", source_lv, snap_lv))?;
        let mut lvs = self.lvs.lock();
        let size = *lvs
            .get(source_lv)
            .ok_or_else(|| Error::not_found("LogicalVolume", device(vg_name, source_lv)))?;
        if lvs.contains_key(snap_lv) {
            return Err(Error::exists("LogicalVolume", device(vg_name, snap_lv)));
        }
        lvs.insert(snap_lv.to_string(), size);
        Ok(device(vg_name, snap_lv))
    }

    async fn clone_from_snapshot(
        &self,
        vg_name: &str,
        snap_lv: &str,
        clone_lv: &str,
    ) -> Result<String> {
        self.log.record("lvm.clone", &format!("{} {}", snap_lv, clone_lv))?;
        let mut lvs = self.lvs.lock();
        let size = *lvs
            .get(snap_lv)
            .ok_or_else(|| Error::not_found("LogicalVolume", device(vg_name, snap_lv)))?;
        if lvs.contains_key(clone_lv) {
            return Err(Error::exists("LogicalVolume", device(vg_name, clone_lv)));
        }
        lvs.insert(clone_lv.to_string(), size);
        Ok(device(vg_name, clone_lv))
    }
}

// =============================================================================
// Filesystems
// =============================================================================

#[derive(Default)]
pub struct FakeFilesystems {
    pub log: EventLog,
    formatted: Mutex<BTreeSet<String>>,
    mounts: Mutex<BTreeMap<String, (String, MountKind)>>,
}

impl FakeFilesystems {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn mount_of(&self, mount_point: &str) -> Option<(String, MountKind)> {
        self.mounts.lock().get(mount_point).cloned()
    }

    pub fn is_formatted(&self, device: &str) -> bool {
        self.formatted.lock().contains(device)
    }
}

#[async_trait]
impl FilesystemManager for FakeFilesystems {
    async fn format(&self, device: &str) -> Result<()> {
        self.log.record("xfs.format", device)?;
        self.formatted.lock().insert(device.to_string());
        Ok(())
    }

    async fn is_mounted(&self, mount_point: &str) -> Result<bool> {
        Ok(self.mounts.lock().contains_key(mount_point))
    }

    async fn mount(&self, device: &str, mount_point: &str, kind: MountKind) -> Result<()> {
        self.log.record("xfs.mount", &format!("{} {}", device, mount_point))?;
        self.mounts
            .lock()
            .entry(mount_point.to_string())
            .or_insert_with(|| (device.to_string(), kind));
        Ok(())
    }

    async fn unmount(&self, mount_point: &str) -> Result<()> {
        self.log.record("xfs.unmount", mount_point)?;
        self.mounts.lock().remove(mount_point);
        Ok(())
    }

    async fn grow(&self, mount_point: &str) -> Result<()> {
        self.log.record("xfs.grow", mount_point)?;
        if !self.mounts.lock().contains_key(mount_point) {
            return Err(Error::command_failed(
                "xfs",
                "grow filesystem",
                format!("{} is not mounted", mount_point),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Cluster
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    pub log: EventLog,
    groups: Mutex<BTreeMap<String, SvmGroupSpec>>,
}

impl FakeCluster {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn group(&self, svm: &str) -> Option<SvmGroupSpec> {
        self.groups.lock().get(svm).cloned()
    }
}

#[async_trait]
impl ClusterCoordinator for FakeCluster {
    async fn group_exists(&self, svm: &str) -> Result<bool> {
        Ok(self.groups.lock().contains_key(svm))
    }

    async fn create_svm_group(&self, spec: &SvmGroupSpec) -> Result<()> {
        self.log.record("pcs.create", &spec.group_name())?;
        self.groups
            .lock()
            .entry(spec.svm.clone())
            .or_insert_with(|| spec.clone());
        Ok(())
    }

    async fn delete_svm_group(&self, svm: &str) -> Result<()> {
        self.log.record("pcs.delete", &format!("g_svm_{}", svm))?;
        self.groups.lock().remove(svm);
        Ok(())
    }
}

// =============================================================================
// Services
// =============================================================================

#[derive(Default)]
pub struct FakeServices {
    pub log: EventLog,
    active: Mutex<BTreeSet<String>>,
}

impl FakeServices {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn start(&self, unit: &str) -> Result<()> {
        self.log.record("systemd.start", unit)?;
        self.active.lock().insert(unit.to_string());
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.log.record("systemd.stop", unit)?;
        self.active.lock().remove(unit);
        Ok(())
    }

    async fn reload(&self, unit: &str) -> Result<()> {
        self.log.record("systemd.reload", unit)
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        Ok(self.active.lock().contains(unit))
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
