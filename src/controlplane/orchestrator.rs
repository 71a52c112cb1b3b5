//! Resource Orchestrator
//!
//! Sequences the five subsystem adapters, the export configuration engine
//! and the state store into the SVM, volume, snapshot and export
//! lifecycles. Every operation validates its input before touching any
//! subsystem, and every multi-step sequence runs through an explicit
//! [`Plan`](crate::controlplane::lifecycle::Plan).

use crate::config::ArcaConfig;
use crate::controlplane::backends::Backends;
use crate::controlplane::exports::{
    ConfigMeta, ConfigSnapshotInfo, ExportConfigEngine, NewExport, RenderOutcome,
};
use crate::controlplane::lifecycle::{self, steps, Progress};
use crate::domain::ports::{ClockRef, LvSpec, MountKind, SvmGroupSpec, SystemClock, VlanAttachment};
use crate::domain::records::{
    export_unit, root_lv_name, snapshot_lv_name, volume_lv_name, Access, ExportEntry, ExportRule,
    SnapshotRecord, SnapshotStatus, Squash, SvmRecord, SvmStatus, VolumeRecord, VolumeStatus,
};
use crate::domain::requests::{
    AddExportRequest, CloneVolumeRequest, CreateSnapshotRequest, CreateSvmRequest,
    CreateVolumeRequest,
};
use crate::error::{Error, Result};
use crate::exec::SystemCommandRunner;
use crate::naming::allocate_vlan_ifname;
use crate::state::StateStore;
use crate::validation;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Orchestrator
// =============================================================================

/// Entry point for every lifecycle operation
pub struct Orchestrator {
    config: Arc<ArcaConfig>,
    store: Arc<StateStore>,
    backends: Backends,
    exports: ExportConfigEngine,
    clock: ClockRef,
}

impl Orchestrator {
    /// Create an orchestrator from explicit collaborators
    pub fn new(
        config: Arc<ArcaConfig>,
        store: Arc<StateStore>,
        backends: Backends,
        clock: ClockRef,
    ) -> Self {
        let exports = ExportConfigEngine::new(config.clone(), backends.services.clone());
        Self {
            config,
            store,
            backends,
            exports,
            clock,
        }
    }

    /// Orchestrator driving the real system tools
    pub fn system(config: ArcaConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(StateStore::open(config.state_dir.clone()));
        let backends = Backends::system(Arc::new(SystemCommandRunner::new()));
        Self::new(config, store, backends, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &ArcaConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn exports(&self) -> &ExportConfigEngine {
        &self.exports
    }

    async fn require_svm(&self, name: &str) -> Result<SvmRecord> {
        self.store
            .get_svm(name)
            .await?
            .ok_or_else(|| Error::not_found("Svm", name))
    }

    async fn require_volume(&self, svm: &str, name: &str) -> Result<VolumeRecord> {
        self.store
            .get_volume(svm, name)
            .await?
            .ok_or_else(|| Error::not_found("Volume", format!("{}/{}", svm, name)))
    }

    // =========================================================================
    // SVM
    // =========================================================================

    /// Create an SVM, or converge a partially created one
    pub async fn create_svm(&self, request: CreateSvmRequest) -> Result<SvmRecord> {
        let name = request.name.as_str();
        validation::validate_name("name", name)?;
        validation::validate_vlan(request.vlan_id)?;
        validation::validate_mtu(request.mtu)?;
        let (ip, prefix) = validation::validate_ip_cidr("ip_cidr", &request.ip_cidr)?;
        let gateway = match request.gateway.as_deref() {
            Some(gw) => validation::validate_ipv4("gateway", gw)?,
            None => validation::infer_gateway(&request.ip_cidr)?,
        }
        .to_string();
        if let Some(size) = request.root_volume_size_gib {
            validation::validate_size("root_volume_size_gib", size)?;
        }

        let existing = self.store.get_svm(name).await?;
        if let Some(existing) = &existing {
            if existing.vlan_id != request.vlan_id || existing.ip_cidr != request.ip_cidr {
                return Err(Error::exists("Svm", name));
            }
            info!("SVM {} already recorded, re-running creation", name);
        }

        let network = self.backends.network.clone();
        let mut progress = Progress::start(&lifecycle::SVM_CREATE, name);

        progress
            .step(&steps::CREATE_NAMESPACE, network.create_namespace(name))
            .await?;

        let ifname = match existing.as_ref().and_then(|e| e.ifname.clone()) {
            Some(ifname) => {
                progress
                    .step(&steps::ALLOCATE_INTERFACE, async move { Ok(ifname) })
                    .await?
            }
            None => {
                progress
                    .step(
                        &steps::ALLOCATE_INTERFACE,
                        allocate_vlan_ifname(network.as_ref(), name, request.vlan_id),
                    )
                    .await?
            }
        };

        let attachment = VlanAttachment {
            namespace: name.to_string(),
            parent_if: self.config.parent_if.clone(),
            vlan_id: request.vlan_id,
            ip_cidr: request.ip_cidr.clone(),
            gateway: Some(gateway.clone()),
            mtu: request.mtu,
            ifname: Some(ifname.clone()),
        };
        progress
            .step(&steps::ATTACH_VLAN, network.attach_vlan(&attachment))
            .await?;

        progress
            .step(&steps::RENDER_EXPORTS, self.exports.render(name))
            .await?;

        match request.root_volume_size_gib {
            Some(size_gib) => {
                let lv_name = root_lv_name(name);
                let spec = LvSpec {
                    vg_name: self.config.vg_name.clone(),
                    lv_name: lv_name.clone(),
                    size_gib,
                    thinpool: Some(self.config.thinpool_name.clone()),
                };
                let device = progress
                    .step(&steps::CREATE_ROOT_VOLUME, async {
                        match self.backends.volumes.create(&spec).await {
                            Err(Error::ResourceExists { .. }) => {
                                debug!("Root volume {} already exists", lv_name);
                                Ok(self.config.lv_path(&lv_name))
                            }
                            other => other,
                        }
                    })
                    .await?;
                progress
                    .step(
                        &steps::FORMAT_ROOT_VOLUME,
                        self.backends.filesystems.format(&device),
                    )
                    .await?;
            }
            None => {
                progress.skip(&steps::CREATE_ROOT_VOLUME, "no root volume requested");
                progress.skip(&steps::FORMAT_ROOT_VOLUME, "no root volume requested");
            }
        }

        let group = SvmGroupSpec {
            svm: name.to_string(),
            mount_path: self.config.svm_root_path(name),
            vlan_id: request.vlan_id,
            ifname: Some(ifname.clone()),
            ip: ip.to_string(),
            prefix,
            gateway: Some(gateway.clone()),
            mtu: request.mtu,
            parent_if: self.config.parent_if.clone(),
            vg_name: self.config.vg_name.clone(),
            drbd_resource: self.config.drbd_resource.clone(),
            ra_vendor: self.config.pacemaker_ra_vendor.clone(),
            create_filesystem: request.root_volume_size_gib.is_some(),
        };
        progress
            .step(
                &steps::CREATE_CLUSTER_GROUP,
                self.backends.cluster.create_svm_group(&group),
            )
            .await?;

        let record = SvmRecord {
            name: name.to_string(),
            vlan_id: request.vlan_id,
            ip_cidr: request.ip_cidr.clone(),
            gateway: Some(gateway),
            mtu: request.mtu,
            namespace: name.to_string(),
            vip: ip.to_string(),
            ifname: Some(ifname),
            root_volume_size_gib: request.root_volume_size_gib,
            status: SvmStatus::Available,
            created_at: existing
                .map(|e| e.created_at)
                .unwrap_or_else(|| self.clock.now()),
        };
        progress
            .step(&steps::RECORD, self.store.upsert_svm(record.clone()))
            .await?;

        progress.finish();
        Ok(record)
    }

    /// Delete an SVM; `force` deletes its volumes first
    pub async fn delete_svm(&self, name: &str, force: bool) -> Result<SvmRecord> {
        validation::validate_name("name", name)?;
        let record = self.require_svm(name).await?;

        let volumes = self.store.list_volumes(Some(name), None).await?;
        if !volumes.is_empty() && !force {
            return Err(Error::ResourceInUse {
                kind: "Svm".to_string(),
                name: name.to_string(),
                dependents: volumes.iter().map(|v| format!("volume:{}", v.name)).collect(),
            });
        }

        let mut progress = Progress::start(&lifecycle::SVM_DELETE, name);

        progress
            .step(&steps::DELETE_VOLUMES, async {
                for volume in &volumes {
                    self.delete_volume(name, &volume.name, true).await?;
                }
                Ok(())
            })
            .await?;

        progress
            .step(
                &steps::DELETE_CLUSTER_GROUP,
                self.backends.cluster.delete_svm_group(name),
            )
            .await?;

        let unit = export_unit(name);
        progress
            .tolerate(&steps::STOP_EXPORT_SERVICE, self.backends.services.stop(&unit))
            .await;

        progress
            .step(
                &steps::DELETE_NAMESPACE,
                self.backends.network.delete_namespace(name),
            )
            .await?;

        progress
            .step(&steps::REMOVE_EXPORT_STATE, self.exports.delete_svm_state(name))
            .await?;

        progress
            .step(&steps::DELETE_RECORD, self.store.delete_svm(name))
            .await?;

        progress.finish();
        Ok(record)
    }

    pub async fn list_svms(&self, name: Option<&str>) -> Result<Vec<SvmRecord>> {
        self.store.list_svms(name).await
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    /// Create, format and mount a volume
    pub async fn create_volume(&self, request: CreateVolumeRequest) -> Result<VolumeRecord> {
        validation::validate_name("svm", &request.svm)?;
        validation::validate_name("name", &request.name)?;
        validation::validate_size("size_gib", request.size_gib)?;
        validation::validate_fs_type(&request.fs_type)?;

        self.require_svm(&request.svm).await?;
        if self
            .store
            .get_volume(&request.svm, &request.name)
            .await?
            .is_some()
        {
            return Err(Error::exists(
                "Volume",
                format!("{}/{}", request.svm, request.name),
            ));
        }

        let lv_name = volume_lv_name(&request.svm, &request.name);
        let mount_path = self.config.volume_path(&request.svm, &request.name);
        let spec = LvSpec {
            vg_name: self.config.vg_name.clone(),
            lv_name: lv_name.clone(),
            size_gib: request.size_gib,
            thinpool: request.thin.then(|| self.config.thinpool_name.clone()),
        };

        let target = format!("{}/{}", request.svm, request.name);
        let mut progress = Progress::start(&lifecycle::VOLUME_CREATE, target);

        let lv_path = progress
            .step(
                &steps::CREATE_LOGICAL_VOLUME,
                self.backends.volumes.create(&spec),
            )
            .await?;
        progress
            .step(
                &steps::FORMAT_FILESYSTEM,
                self.backends.filesystems.format(&lv_path),
            )
            .await?;
        progress
            .step(
                &steps::MOUNT_FILESYSTEM,
                self.backends
                    .filesystems
                    .mount(&lv_path, &mount_path, MountKind::Fresh),
            )
            .await?;

        let record = VolumeRecord {
            name: request.name.clone(),
            svm: request.svm.clone(),
            size_gib: request.size_gib,
            thin: request.thin,
            fs_type: request.fs_type.clone(),
            mount_path,
            lv_path,
            lv_name,
            cloned_from: None,
            status: VolumeStatus::Available,
            created_at: self.clock.now(),
        };
        progress
            .step(&steps::RECORD, self.store.upsert_volume(record.clone()))
            .await?;

        progress.finish();
        Ok(record)
    }

    /// Grow a volume and its filesystem
    pub async fn resize_volume(
        &self,
        svm: &str,
        name: &str,
        new_size_gib: u64,
    ) -> Result<VolumeRecord> {
        validation::validate_name("svm", svm)?;
        validation::validate_name("name", name)?;
        validation::validate_size("size_gib", new_size_gib)?;

        let current = self.require_volume(svm, name).await?;
        if new_size_gib <= current.size_gib {
            return Err(Error::validation(
                "size_gib",
                format!(
                    "must be greater than the current size of {} GiB",
                    current.size_gib
                ),
            ));
        }

        let mut progress = Progress::start(&lifecycle::VOLUME_RESIZE, format!("{}/{}", svm, name));
        progress
            .step(
                &steps::EXTEND_LOGICAL_VOLUME,
                self.backends
                    .volumes
                    .resize(&self.config.vg_name, &current.lv_name, new_size_gib),
            )
            .await?;
        progress
            .step(
                &steps::GROW_FILESYSTEM,
                self.backends.filesystems.grow(&current.mount_path),
            )
            .await?;

        let record = VolumeRecord {
            size_gib: new_size_gib,
            status: VolumeStatus::Available,
            ..current
        };
        progress
            .step(&steps::RECORD, self.store.upsert_volume(record.clone()))
            .await?;

        progress.finish();
        Ok(record)
    }

    /// Unmount and remove a volume; `force` drops its exports and snapshots first
    pub async fn delete_volume(&self, svm: &str, name: &str, force: bool) -> Result<VolumeRecord> {
        validation::validate_name("svm", svm)?;
        validation::validate_name("name", name)?;
        let record = self.require_volume(svm, name).await?;

        let snapshots = self.store.list_snapshots(Some(svm), Some(name), None).await?;
        let exports = self.exports.volume_rules(svm, name).await?;
        if !force && (!snapshots.is_empty() || !exports.is_empty()) {
            let dependents = snapshots
                .iter()
                .map(|s| format!("snapshot:{}", s.name))
                .chain(
                    exports
                        .iter()
                        .map(|e| format!("export:{}:{}", e.export_id, e.client)),
                )
                .collect();
            return Err(Error::ResourceInUse {
                kind: "Volume".to_string(),
                name: format!("{}/{}", svm, name),
                dependents,
            });
        }

        let mut progress = Progress::start(&lifecycle::VOLUME_DELETE, format!("{}/{}", svm, name));

        progress
            .step(&steps::REMOVE_EXPORTS, async {
                self.exports.remove_volume(svm, name).await.map(|_| ())
            })
            .await?;

        progress
            .step(&steps::DELETE_SNAPSHOTS, async {
                for snapshot in &snapshots {
                    self.backends
                        .volumes
                        .delete(&self.config.vg_name, &snapshot.lv_name)
                        .await?;
                    self.store
                        .delete_snapshot(svm, name, &snapshot.name)
                        .await?;
                }
                Ok(())
            })
            .await?;

        progress
            .step(
                &steps::UNMOUNT_FILESYSTEM,
                self.backends.filesystems.unmount(&record.mount_path),
            )
            .await?;
        progress
            .step(
                &steps::DELETE_LOGICAL_VOLUME,
                self.backends
                    .volumes
                    .delete(&self.config.vg_name, &record.lv_name),
            )
            .await?;
        progress
            .step(&steps::DELETE_RECORD, self.store.delete_volume(svm, name))
            .await?;

        progress.finish();
        Ok(record)
    }

    pub async fn list_volumes(
        &self,
        svm: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<VolumeRecord>> {
        self.store.list_volumes(svm, name).await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Take a thin snapshot of a volume
    pub async fn create_snapshot(&self, request: CreateSnapshotRequest) -> Result<SnapshotRecord> {
        validation::validate_name("svm", &request.svm)?;
        validation::validate_name("volume", &request.volume)?;
        validation::validate_name("name", &request.name)?;

        let volume = self.require_volume(&request.svm, &request.volume).await?;
        if self
            .store
            .get_snapshot(&request.svm, &request.volume, &request.name)
            .await?
            .is_some()
        {
            return Err(Error::exists(
                "Snapshot",
                format!("{}/{}@{}", request.svm, request.volume, request.name),
            ));
        }

        let lv_name = snapshot_lv_name(&request.svm, &request.volume, &request.name);
        let target = format!("{}/{}@{}", request.svm, request.volume, request.name);
        let mut progress = Progress::start(&lifecycle::SNAPSHOT_CREATE, target);

        let lv_path = progress
            .step(
                &steps::CREATE_SNAPSHOT,
                self.backends
                    .volumes
                    .snapshot(&self.config.vg_name, &volume.lv_name, &lv_name),
            )
            .await?;

        let record = SnapshotRecord {
            name: request.name.clone(),
            svm: request.svm.clone(),
            volume: request.volume.clone(),
            lv_path,
            lv_name,
            status: SnapshotStatus::Available,
            created_at: self.clock.now(),
        };
        progress
            .step(&steps::RECORD, self.store.upsert_snapshot(record.clone()))
            .await?;

        progress.finish();
        Ok(record)
    }

    /// Remove a snapshot
    pub async fn delete_snapshot(
        &self,
        svm: &str,
        volume: &str,
        name: &str,
    ) -> Result<SnapshotRecord> {
        validation::validate_name("svm", svm)?;
        validation::validate_name("volume", volume)?;
        validation::validate_name("name", name)?;

        let record = self
            .store
            .get_snapshot(svm, volume, name)
            .await?
            .ok_or_else(|| Error::not_found("Snapshot", format!("{}/{}@{}", svm, volume, name)))?;

        let mut progress = Progress::start(
            &lifecycle::SNAPSHOT_DELETE,
            format!("{}/{}@{}", svm, volume, name),
        );
        progress
            .step(
                &steps::DELETE_LOGICAL_VOLUME,
                self.backends
                    .volumes
                    .delete(&self.config.vg_name, &record.lv_name),
            )
            .await?;
        progress
            .step(
                &steps::DELETE_RECORD,
                self.store.delete_snapshot(svm, volume, name),
            )
            .await?;

        progress.finish();
        Ok(record)
    }

    pub async fn list_snapshots(
        &self,
        svm: Option<&str>,
        volume: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<SnapshotRecord>> {
        self.store.list_snapshots(svm, volume, name).await
    }

    /// Create a writable volume from a snapshot without reformatting it
    pub async fn clone_volume(&self, request: CloneVolumeRequest) -> Result<VolumeRecord> {
        validation::validate_name("svm", &request.svm)?;
        validation::validate_name("name", &request.name)?;
        validation::validate_name("snapshot", &request.snapshot)?;
        if let Some(source) = &request.source_volume {
            validation::validate_name("source_volume", source)?;
        }
        if let Some(size) = request.size_gib {
            validation::validate_size("size_gib", size)?;
        }

        let mut candidates = self
            .store
            .list_snapshots(
                Some(&request.svm),
                request.source_volume.as_deref(),
                Some(&request.snapshot),
            )
            .await?;
        let snapshot = match candidates.len() {
            0 => {
                return Err(Error::not_found(
                    "Snapshot",
                    format!("{}/{}", request.svm, request.snapshot),
                ))
            }
            1 => candidates.remove(0),
            _ => {
                return Err(Error::validation(
                    "source_volume",
                    format!(
                        "snapshot {} exists on several volumes; specify the source volume",
                        request.snapshot
                    ),
                ))
            }
        };

        let source = self.require_volume(&request.svm, &snapshot.volume).await?;
        if self
            .store
            .get_volume(&request.svm, &request.name)
            .await?
            .is_some()
        {
            return Err(Error::exists(
                "Volume",
                format!("{}/{}", request.svm, request.name),
            ));
        }

        let size_gib = request.size_gib.unwrap_or(source.size_gib);
        if size_gib < source.size_gib {
            return Err(Error::validation(
                "size_gib",
                format!(
                    "cannot be smaller than the source volume ({} GiB)",
                    source.size_gib
                ),
            ));
        }

        let lv_name = volume_lv_name(&request.svm, &request.name);
        let mount_path = self.config.volume_path(&request.svm, &request.name);
        let target = format!("{}/{}", request.svm, request.name);
        let mut progress = Progress::start(&lifecycle::VOLUME_CLONE, target);

        let lv_path = progress
            .step(
                &steps::CLONE_SNAPSHOT,
                self.backends.volumes.clone_from_snapshot(
                    &self.config.vg_name,
                    &snapshot.lv_name,
                    &lv_name,
                ),
            )
            .await?;
        progress
            .step(
                &steps::MOUNT_FILESYSTEM,
                self.backends
                    .filesystems
                    .mount(&lv_path, &mount_path, MountKind::Clone),
            )
            .await?;

        if size_gib > source.size_gib {
            progress
                .step(
                    &steps::EXTEND_LOGICAL_VOLUME,
                    self.backends
                        .volumes
                        .resize(&self.config.vg_name, &lv_name, size_gib),
                )
                .await?;
            progress
                .step(
                    &steps::GROW_FILESYSTEM,
                    self.backends.filesystems.grow(&mount_path),
                )
                .await?;
        } else {
            progress.skip(&steps::EXTEND_LOGICAL_VOLUME, "same size as source");
            progress.skip(&steps::GROW_FILESYSTEM, "same size as source");
        }

        let record = VolumeRecord {
            name: request.name.clone(),
            svm: request.svm.clone(),
            size_gib,
            thin: true,
            fs_type: source.fs_type.clone(),
            mount_path,
            lv_path,
            lv_name,
            cloned_from: Some(format!("{}@{}", snapshot.volume, snapshot.name)),
            status: VolumeStatus::Available,
            created_at: self.clock.now(),
        };
        progress
            .step(&steps::RECORD, self.store.upsert_volume(record.clone()))
            .await?;

        progress.finish();
        Ok(record)
    }

    // =========================================================================
    // Exports
    // =========================================================================

    /// Export a volume to a client network
    pub async fn add_export(&self, request: AddExportRequest) -> Result<ExportEntry> {
        validation::validate_name("svm", &request.svm)?;
        validation::validate_name("volume", &request.volume)?;
        validation::validate_ip_cidr("client", &request.client)?;
        validation::validate_access(&request.access)?;
        validation::validate_sec(&request.sec)?;
        let access = Access::parse(&request.access)
            .ok_or_else(|| Error::validation("access", "must be 'rw' or 'ro'"))?;

        self.require_svm(&request.svm).await?;
        self.require_volume(&request.svm, &request.volume).await?;

        let export = NewExport {
            client: request.client.clone(),
            access,
            squash: Squash::from_root_squash(request.root_squash),
            sec: request.sec.iter().map(|s| s.trim().to_string()).collect(),
        };

        let target = format!("{}/{}", request.svm, request.volume);
        let mut progress = Progress::start(&lifecycle::EXPORT_ADD, target);
        let rule = progress
            .step(
                &steps::ADD_EXPORT_RULE,
                self.exports.add(&request.svm, &request.volume, export),
            )
            .await?;
        progress.finish();

        Ok(ExportEntry {
            svm: request.svm,
            volume: request.volume,
            rule,
        })
    }

    /// Remove the export of a volume to a client network
    pub async fn remove_export(
        &self,
        svm: &str,
        volume: &str,
        client: &str,
    ) -> Result<Vec<ExportRule>> {
        validation::validate_name("svm", svm)?;
        validation::validate_name("volume", volume)?;
        validation::validate_ip_cidr("client", client)?;

        let mut progress = Progress::start(&lifecycle::EXPORT_REMOVE, format!("{}/{}", svm, volume));
        let removed = progress
            .step(
                &steps::REMOVE_EXPORT_RULE,
                self.exports.remove(svm, volume, client),
            )
            .await?;
        progress.finish();
        Ok(removed)
    }

    pub async fn list_exports(
        &self,
        svm: Option<&str>,
        volume: Option<&str>,
        client: Option<&str>,
    ) -> Result<Vec<ExportEntry>> {
        self.exports.list_exports(svm, volume, client).await
    }

    /// Re-render an SVM's export document and reload its service
    pub async fn sync_exports(&self, svm: &str) -> Result<RenderOutcome> {
        validation::validate_name("svm", svm)?;
        self.require_svm(svm).await?;
        self.exports.sync(svm).await
    }

    /// Restore a previously rendered export document
    pub async fn rollback_exports(&self, svm: &str, version: &str) -> Result<RenderOutcome> {
        validation::validate_name("svm", svm)?;
        self.require_svm(svm).await?;
        self.exports.rollback(svm, version).await
    }

    pub async fn list_config_snapshots(&self, svm: &str) -> Result<Vec<ConfigSnapshotInfo>> {
        validation::validate_name("svm", svm)?;
        self.exports.list_config_snapshots(svm).await
    }

    pub async fn read_config_snapshot_meta(&self, svm: &str, version: &str) -> Result<ConfigMeta> {
        validation::validate_name("svm", svm)?;
        self.exports.read_config_snapshot_meta(svm, version).await
    }
}
