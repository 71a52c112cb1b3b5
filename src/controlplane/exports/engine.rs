//! Export Configuration Engine
//!
//! Owns the per-SVM export list (`exports.<svm>.json` in the state
//! directory, with the id high-water mark in `export_ids.<svm>.json`),
//! renders it into the live NFS-Ganesha document, keeps a
//! content-addressed snapshot of every rendered version plus a `latest`
//! alias under `<state_dir>/config/`, and reloads the export service.
//!
//! Operations on the same SVM are serialized by a per-SVM async lock.

use crate::config::ArcaConfig;
use crate::controlplane::exports::render::{self, is_config_version, ConfigMeta, RenderedConfig};
use crate::domain::ports::ServiceManagerRef;
use crate::domain::records::{export_unit, Access, ExportEntry, ExportRule, Squash};
use crate::error::{Error, Result};
use crate::state::atomic;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Alias for the most recently rendered snapshot
pub const LATEST: &str = "latest";

/// Export root used before it became configurable
const LEGACY_EXPORT_ROOT: &str = "/exports";

/// A rule to add, already validated
#[derive(Debug, Clone)]
pub struct NewExport {
    pub client: String,
    pub access: Access,
    pub squash: Squash,
    pub sec: Vec<String>,
}

/// Result of rendering an SVM's document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub svm: String,
    pub config_version: String,
    pub path: PathBuf,
    /// Whether the live document was rewritten
    pub changed: bool,
}

/// A stored config snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshotInfo {
    pub config_version: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Highest export id ever assigned to an SVM
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExportIds {
    last_export_id: u32,
}

/// Export list, rendering and rollback for every SVM
pub struct ExportConfigEngine {
    config: Arc<ArcaConfig>,
    services: ServiceManagerRef,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ExportConfigEngine {
    pub fn new(config: Arc<ArcaConfig>, services: ServiceManagerRef) -> Self {
        Self {
            config,
            services,
            locks: DashMap::new(),
        }
    }

    // =========================================================================
    // Paths
    // =========================================================================

    fn exports_path(&self, svm: &str) -> PathBuf {
        self.config.state_dir.join(format!("exports.{}.json", svm))
    }

    fn export_ids_path(&self, svm: &str) -> PathBuf {
        self.config.state_dir.join(format!("export_ids.{}.json", svm))
    }

    /// Live document read by the export service
    pub fn live_path(&self, svm: &str) -> PathBuf {
        self.config
            .ganesha_config_dir
            .join(format!("ganesha.{}.conf", svm))
    }

    fn snapshot_path(&self, svm: &str, version: &str) -> PathBuf {
        self.config
            .config_snapshot_dir()
            .join(format!("{}.{}.conf", svm, version))
    }

    fn snapshot_meta_path(&self, svm: &str, version: &str) -> PathBuf {
        self.config
            .config_snapshot_dir()
            .join(format!("{}.{}.json", svm, version))
    }

    /// Every path an export of this volume may carry
    fn volume_paths(&self, svm: &str, volume: &str) -> Vec<String> {
        let current = self.config.volume_path(svm, volume);
        let legacy = format!("{}/{}/{}", LEGACY_EXPORT_ROOT, svm, volume);
        if legacy == current {
            vec![current]
        } else {
            vec![current, legacy]
        }
    }

    async fn lock(&self, svm: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(svm.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    // =========================================================================
    // Export List
    // =========================================================================

    async fn load(&self, svm: &str) -> Result<Vec<ExportRule>> {
        atomic::read_json_or_default(&self.exports_path(svm)).await
    }

    async fn save(&self, svm: &str, rules: &[ExportRule]) -> Result<()> {
        atomic::write_json_atomic(&self.exports_path(svm), &rules).await
    }

    /// Rules of one SVM, in render order
    pub async fn rules(&self, svm: &str) -> Result<Vec<ExportRule>> {
        let mut rules = self.load(svm).await?;
        render::sort_rules(&mut rules);
        Ok(rules)
    }

    /// Rules exporting a given volume
    pub async fn volume_rules(&self, svm: &str, volume: &str) -> Result<Vec<ExportRule>> {
        let paths = self.volume_paths(svm, volume);
        Ok(self
            .rules(svm)
            .await?
            .into_iter()
            .filter(|r| paths.contains(&r.path))
            .collect())
    }

    /// Append a rule with the next export id, re-render and reload.
    ///
    /// Re-adding an identical rule re-renders, reloads and returns the stored
    /// rule, so an add whose reload failed can be retried as is. A rule for
    /// the same client with different parameters is a conflict.
    pub async fn add(&self, svm: &str, volume: &str, export: NewExport) -> Result<ExportRule> {
        let _guard = self.lock(svm).await;
        let mut rules = self.load(svm).await?;

        let path = self.config.volume_path(svm, volume);
        if let Some(existing) = rules
            .iter()
            .find(|r| r.path == path && r.client == export.client)
        {
            if existing.access != export.access
                || existing.squash != export.squash
                || existing.sec != export.sec
            {
                return Err(Error::exists("Export", format!("{} {}", path, export.client)));
            }
            let existing = existing.clone();
            self.render_locked(svm, &rules).await?;
            self.reload(svm).await?;
            debug!(
                "Export {} of {} to {} for {} already present",
                existing.export_id, existing.path, svm, existing.client
            );
            return Ok(existing);
        }

        // The high-water mark keeps a removed highest id from coming back
        let mut ids: ExportIds = atomic::read_json_or_default(&self.export_ids_path(svm)).await?;
        let export_id = rules
            .iter()
            .map(|r| r.export_id)
            .max()
            .unwrap_or(0)
            .max(ids.last_export_id)
            + 1;
        ids.last_export_id = export_id;
        let rule = ExportRule {
            export_id,
            pseudo: path.clone(),
            path,
            access: export.access,
            squash: export.squash,
            sec: export.sec,
            client: export.client,
        };
        rules.push(rule.clone());

        atomic::write_json_atomic(&self.export_ids_path(svm), &ids).await?;
        self.save(svm, &rules).await?;
        self.render_locked(svm, &rules).await?;
        self.reload(svm).await?;

        info!(
            "Added export {} of {} to {} for {}",
            rule.export_id, rule.path, svm, rule.client
        );
        Ok(rule)
    }

    /// Remove the rule for `(volume, client)`, re-render and reload
    pub async fn remove(&self, svm: &str, volume: &str, client: &str) -> Result<Vec<ExportRule>> {
        let _guard = self.lock(svm).await;
        let paths = self.volume_paths(svm, volume);

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .load(svm)
            .await?
            .into_iter()
            .partition(|r| paths.contains(&r.path) && r.client == client);
        if removed.is_empty() {
            return Err(Error::not_found(
                "Export",
                format!("{}/{} {}", svm, volume, client),
            ));
        }

        self.save(svm, &kept).await?;
        self.render_locked(svm, &kept).await?;
        self.reload(svm).await?;

        info!("Removed {} export rule(s) of {}/{} for {}", removed.len(), svm, volume, client);
        Ok(removed)
    }

    /// Remove every rule of a volume; no-op (and no reload) when none exist
    pub async fn remove_volume(&self, svm: &str, volume: &str) -> Result<Vec<ExportRule>> {
        let _guard = self.lock(svm).await;
        let paths = self.volume_paths(svm, volume);

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .load(svm)
            .await?
            .into_iter()
            .partition(|r| paths.contains(&r.path));
        if removed.is_empty() {
            return Ok(removed);
        }

        self.save(svm, &kept).await?;
        self.render_locked(svm, &kept).await?;
        self.reload(svm).await?;

        info!("Removed all {} export rule(s) of {}/{}", removed.len(), svm, volume);
        Ok(removed)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    async fn render_locked(&self, svm: &str, rules: &[ExportRule]) -> Result<RenderOutcome> {
        let RenderedConfig {
            config_version,
            content,
            meta,
        } = render::render(svm, rules, &self.config)?;

        atomic::write_if_changed(&self.snapshot_path(svm, &config_version), &content).await?;
        atomic::write_if_changed(&self.snapshot_path(svm, LATEST), &content).await?;
        atomic::write_json_if_changed(&self.snapshot_meta_path(svm, &config_version), &meta).await?;
        atomic::write_json_if_changed(&self.snapshot_meta_path(svm, LATEST), &meta).await?;

        let path = self.live_path(svm);
        let changed = atomic::write_if_changed(&path, &content).await?;
        if changed {
            info!("Rendered {} (config_version {})", path.display(), config_version);
        } else {
            debug!("{} unchanged at config_version {}", path.display(), config_version);
        }

        Ok(RenderOutcome {
            svm: svm.to_string(),
            config_version,
            path,
            changed,
        })
    }

    /// Render from the persisted list without reloading
    pub async fn render(&self, svm: &str) -> Result<RenderOutcome> {
        let _guard = self.lock(svm).await;
        let rules = self.load(svm).await?;
        self.render_locked(svm, &rules).await
    }

    /// Render from the persisted list and reload
    pub async fn sync(&self, svm: &str) -> Result<RenderOutcome> {
        let _guard = self.lock(svm).await;
        let rules = self.load(svm).await?;
        let outcome = self.render_locked(svm, &rules).await?;
        self.reload(svm).await?;
        Ok(outcome)
    }

    async fn reload(&self, svm: &str) -> Result<()> {
        self.services.reload(&export_unit(svm)).await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    fn check_version(version: &str) -> Result<()> {
        if version == LATEST || is_config_version(version) {
            Ok(())
        } else {
            Err(Error::validation(
                "config_version",
                format!("must be '{}' or {} hex characters", LATEST, render::CONFIG_VERSION_LEN),
            ))
        }
    }

    /// Copy a snapshotted document back onto the live path and reload
    pub async fn rollback(&self, svm: &str, version: &str) -> Result<RenderOutcome> {
        Self::check_version(version)?;
        let _guard = self.lock(svm).await;

        let snapshot = self.snapshot_path(svm, version);
        let content = match tokio::fs::read_to_string(&snapshot).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(
                    "ConfigSnapshot",
                    format!("{}@{}", svm, version),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let path = self.live_path(svm);
        let changed = atomic::write_if_changed(&path, &content).await?;
        self.reload(svm).await?;

        let config_version = if version == LATEST {
            self.read_config_snapshot_meta(svm, LATEST)
                .await
                .map(|m| m.config_version)
                .unwrap_or_else(|_| LATEST.to_string())
        } else {
            version.to_string()
        };
        info!("Rolled back {} to config_version {}", svm, config_version);

        Ok(RenderOutcome {
            svm: svm.to_string(),
            config_version,
            path,
            changed,
        })
    }

    /// Stored snapshots of an SVM, newest first, excluding `latest`
    pub async fn list_config_snapshots(&self, svm: &str) -> Result<Vec<ConfigSnapshotInfo>> {
        let dir = self.config.config_snapshot_dir();
        let pattern = format!(
            "{}/{}.*.conf",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(svm)
        );
        let prefix = format!("{}.", svm);

        let mut snapshots = Vec::new();
        for path in glob_paths(&pattern)? {
            let Some(version) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|n| n.strip_suffix(".conf"))
            else {
                continue;
            };
            // Skips `latest` and files of SVMs whose name extends this one
            if !is_config_version(version) {
                continue;
            }
            let modified = tokio::fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            snapshots.push(ConfigSnapshotInfo {
                config_version: version.to_string(),
                path,
                modified,
            });
        }

        snapshots.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.config_version.cmp(&b.config_version))
        });
        Ok(snapshots)
    }

    /// Metadata sidecar of a snapshot
    pub async fn read_config_snapshot_meta(&self, svm: &str, version: &str) -> Result<ConfigMeta> {
        Self::check_version(version)?;
        let path = self.snapshot_meta_path(svm, version);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(
                "ConfigSnapshot",
                format!("{}@{}", svm, version),
            )),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Listing & Cleanup
    // =========================================================================

    /// Export rules across SVMs, annotated with SVM and volume
    pub async fn list_exports(
        &self,
        svm: Option<&str>,
        volume: Option<&str>,
        client: Option<&str>,
    ) -> Result<Vec<ExportEntry>> {
        let svms = match svm {
            Some(name) => vec![name.to_string()],
            None => self.svms_with_exports()?,
        };

        let mut entries = Vec::new();
        for name in svms {
            for rule in self.rules(&name).await? {
                let entry = ExportEntry {
                    svm: name.clone(),
                    volume: rule.volume().to_string(),
                    rule,
                };
                if volume.map_or(true, |v| entry.volume == v)
                    && client.map_or(true, |c| entry.rule.client == c)
                {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn svms_with_exports(&self) -> Result<Vec<String>> {
        let pattern = format!(
            "{}/exports.*.json",
            glob::Pattern::escape(&self.config.state_dir.to_string_lossy())
        );
        let mut svms: Vec<String> = glob_paths(&pattern)?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter_map(|n| n.strip_prefix("exports.")?.strip_suffix(".json"))
            .map(String::from)
            .collect();
        svms.sort();
        Ok(svms)
    }

    /// Drop an SVM's export list and live document; snapshots are kept
    pub async fn delete_svm_state(&self, svm: &str) -> Result<()> {
        let guard = self.lock(svm).await;
        if atomic::remove_if_exists(&self.exports_path(svm)).await? {
            debug!("Removed export list of {}", svm);
        }
        atomic::remove_if_exists(&self.export_ids_path(svm)).await?;
        if atomic::remove_if_exists(&self.live_path(svm)).await? {
            debug!("Removed live export document of {}", svm);
        }
        drop(guard);
        // A waiter holding the mutex keeps the entry, so it cannot be replaced
        self.locks.remove_if(svm, |_, lock| Arc::strong_count(lock) == 1);
        Ok(())
    }
}

fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Internal(format!("invalid glob pattern {}: {}", pattern, e)))?;
    Ok(paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path {}: {}", e.path().display(), e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EventLog, FakeServices};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        log: EventLog,
        engine: ExportConfigEngine,
        config: Arc<ArcaConfig>,
    }

    fn harness() -> Harness {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(ArcaConfig::rooted_at(tmp.path()));
        let log = EventLog::default();
        let services = Arc::new(FakeServices::with_log(log.clone()));
        Harness {
            engine: ExportConfigEngine::new(config.clone(), services),
            _tmp: tmp,
            log,
            config,
        }
    }

    fn rw(client: &str) -> NewExport {
        NewExport {
            client: client.into(),
            access: Access::ReadWrite,
            squash: Squash::RootSquash,
            sec: vec!["sys".into()],
        }
    }

    #[tokio::test]
    async fn test_add_assigns_ids_and_reloads() {
        let h = harness();

        let first = h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        let second = h.engine.add("tenantA", "vol1", rw("10.0.1.0/24")).await.unwrap();
        assert_eq!((first.export_id, second.export_id), (1, 2));
        assert_eq!(first.path, "/exports/tenantA/vol1");
        assert_eq!(first.pseudo, first.path);

        let live = std::fs::read_to_string(h.engine.live_path("tenantA")).unwrap();
        assert!(live.contains("Clients = 10.0.1.0/24;"));
        assert_eq!(h.log.count("systemd.reload"), 2);

        let again = h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(h.engine.rules("tenantA").await.unwrap().len(), 2);

        let mut ro = rw("10.0.0.0/24");
        ro.access = Access::ReadOnly;
        let err = h.engine.add("tenantA", "vol1", ro).await.unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });
    }

    #[tokio::test]
    async fn test_add_retry_after_failed_reload() {
        let h = harness();
        h.log.fail_on("systemd.reload");

        let err = h.engine.add("tenantA", "vol1", rw("10.0.1.0/24")).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed { .. });
        assert_eq!(h.engine.rules("tenantA").await.unwrap().len(), 1);

        h.log.clear_failures();
        let rule = h.engine.add("tenantA", "vol1", rw("10.0.1.0/24")).await.unwrap();
        assert_eq!(rule.export_id, 1);
        assert_eq!(h.engine.rules("tenantA").await.unwrap(), vec![rule]);
        assert_eq!(h.log.count("systemd.reload"), 2);

        let next = h.engine.add("tenantA", "vol1", rw("10.0.2.0/24")).await.unwrap();
        assert_eq!(next.export_id, 2);
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        h.engine.add("tenantA", "vol2", rw("10.0.0.0/24")).await.unwrap();
        h.engine.remove("tenantA", "vol1", "10.0.0.0/24").await.unwrap();

        let next = h.engine.add("tenantA", "vol3", rw("10.0.0.0/24")).await.unwrap();
        assert_eq!(next.export_id, 3);

        // Removing the highest id does not free it either
        h.engine.remove("tenantA", "vol3", "10.0.0.0/24").await.unwrap();
        let after = h.engine.add("tenantA", "vol4", rw("10.0.0.0/24")).await.unwrap();
        assert_eq!(after.export_id, 4);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();

        let err = h.engine.remove("tenantA", "vol1", "10.9.9.0/24").await.unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
        assert_eq!(h.engine.rules("tenantA").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_matches_legacy_root() {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(ArcaConfig {
            export_dir: "/srv/nfs".into(),
            ..ArcaConfig::rooted_at(tmp.path())
        });
        let engine = ExportConfigEngine::new(config.clone(), Arc::new(FakeServices::default()));

        // A rule written while the export root was still /exports
        let legacy = ExportRule {
            export_id: 1,
            path: "/exports/tenantA/vol1".into(),
            pseudo: "/exports/tenantA/vol1".into(),
            access: Access::ReadWrite,
            squash: Squash::RootSquash,
            sec: vec!["sys".into()],
            client: "10.0.0.0/24".into(),
        };
        engine.save("tenantA", &[legacy]).await.unwrap();
        let current = engine.add("tenantA", "vol1", rw("10.0.1.0/24")).await.unwrap();
        assert_eq!(current.path, "/srv/nfs/tenantA/vol1");

        let removed = engine.remove("tenantA", "vol1", "10.0.0.0/24").await.unwrap();
        assert_eq!(removed[0].export_id, 1);
        assert_eq!(engine.volume_rules("tenantA", "vol1").await.unwrap(), vec![current]);
    }

    #[tokio::test]
    async fn test_unchanged_render_skips_writes() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        let live = h.engine.live_path("tenantA");
        let before = std::fs::metadata(&live).unwrap().modified().unwrap();

        let outcome = h.engine.render("tenantA").await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(std::fs::metadata(&live).unwrap().modified().unwrap(), before);

        let again = h.engine.sync("tenantA").await.unwrap();
        assert_eq!(again.config_version, outcome.config_version);
    }

    #[tokio::test]
    async fn test_rollback_latest_after_sync() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        let synced = h.engine.sync("tenantA").await.unwrap();
        let expected = std::fs::read_to_string(&synced.path).unwrap();

        std::fs::write(&synced.path, "# hand edited\n").unwrap();
        let rolled = h.engine.rollback("tenantA", LATEST).await.unwrap();
        assert!(rolled.changed);
        assert_eq!(rolled.config_version, synced.config_version);
        assert_eq!(std::fs::read_to_string(&synced.path).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_rollback_to_older_version() {
        let h = harness();
        let v1 = {
            h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
            h.engine.render("tenantA").await.unwrap().config_version
        };
        h.engine.add("tenantA", "vol2", rw("10.0.0.0/24")).await.unwrap();

        h.engine.rollback("tenantA", &v1).await.unwrap();
        let live = std::fs::read_to_string(h.engine.live_path("tenantA")).unwrap();
        assert!(live.contains(&format!("config_version: {}", v1)));
        assert!(!live.contains("/exports/tenantA/vol2"));

        let err = h.engine.rollback("tenantA", "0123456789ab").await.unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { ref kind, .. } if kind == "ConfigSnapshot");
        let err = h.engine.rollback("tenantA", "../../etc/passwd").await.unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }

    #[tokio::test]
    async fn test_snapshot_listing_and_meta() {
        let h = harness();
        h.engine.add("a", "vol1", rw("10.0.0.0/24")).await.unwrap();
        h.engine.add("a", "vol2", rw("10.0.0.0/24")).await.unwrap();
        // An SVM whose name extends "a" must not leak into its listing
        h.engine.add("a.b", "vol1", rw("10.0.0.0/24")).await.unwrap();

        let snapshots = h.engine.list_config_snapshots("a").await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| is_config_version(&s.config_version)));

        let latest = h.engine.read_config_snapshot_meta("a", LATEST).await.unwrap();
        assert_eq!(latest.exports.len(), 2);
        assert!(snapshots.iter().any(|s| s.config_version == latest.config_version));
        assert_eq!(latest.template_version, render::TEMPLATE_VERSION);

        let err = h.engine.read_config_snapshot_meta("nobody", LATEST).await.unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
    }

    #[tokio::test]
    async fn test_list_exports_filters() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();
        h.engine.add("tenantA", "vol2", rw("10.0.1.0/24")).await.unwrap();
        h.engine.add("tenantB", "vol1", rw("10.0.0.0/24")).await.unwrap();

        assert_eq!(h.engine.list_exports(None, None, None).await.unwrap().len(), 3);

        let vol1 = h.engine.list_exports(None, Some("vol1"), None).await.unwrap();
        assert_eq!(
            vol1.iter().map(|e| e.svm.as_str()).collect::<Vec<_>>(),
            vec!["tenantA", "tenantB"]
        );

        let by_client = h
            .engine
            .list_exports(Some("tenantA"), None, Some("10.0.1.0/24"))
            .await
            .unwrap();
        assert_eq!(by_client.len(), 1);
        assert_eq!(by_client[0].volume, "vol2");
    }

    #[tokio::test]
    async fn test_delete_svm_state_keeps_snapshots() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();

        h.engine.delete_svm_state("tenantA").await.unwrap();
        assert!(!h.engine.live_path("tenantA").exists());
        assert!(h.engine.rules("tenantA").await.unwrap().is_empty());
        assert_eq!(h.engine.list_config_snapshots("tenantA").await.unwrap().len(), 1);
        assert!(h.config.config_snapshot_dir().join("tenantA.latest.conf").exists());
    }

    #[tokio::test]
    async fn test_delete_svm_state_keeps_lock_in_use() {
        let h = harness();
        h.engine.add("tenantA", "vol1", rw("10.0.0.0/24")).await.unwrap();

        let held = h.engine.locks.get("tenantA").map(|l| l.clone()).unwrap();
        h.engine.delete_svm_state("tenantA").await.unwrap();
        let current = h.engine.locks.get("tenantA").map(|l| l.clone()).unwrap();
        assert!(Arc::ptr_eq(&held, &current));

        drop((held, current));
        h.engine.delete_svm_state("tenantA").await.unwrap();
        assert!(h.engine.locks.get("tenantA").is_none());
    }

    #[tokio::test]
    async fn test_remove_volume_without_rules_does_not_reload() {
        let h = harness();
        let removed = h.engine.remove_volume("tenantA", "vol1").await.unwrap();
        assert!(removed.is_empty());
        assert_eq!(h.log.count("systemd.reload"), 0);
    }
}
