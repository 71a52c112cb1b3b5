//! LVM Volume Adapter
//!
//! Thin and thick logical volumes, thin snapshots and writable clones,
//! driven through the LVM command line tools.

use crate::domain::ports::{CommandRunnerRef, LvSpec, VolumeManager};
use crate::error::{Error, Result};
use crate::exec::Invocation;
use async_trait::async_trait;
use tracing::{debug, info};

const TOOL: &str = "lvm";

/// [`VolumeManager`] backed by `lvcreate`/`lvextend`/`lvremove`
pub struct LvmManager {
    runner: CommandRunnerRef,
}

impl LvmManager {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    fn lv_path(vg_name: &str, lv_name: &str) -> String {
        format!("/dev/{}/{}", vg_name, lv_name)
    }

    async fn lvcreate(&self, invocation: Invocation, operation: &str) -> Result<()> {
        self.runner.run(&invocation).await?.check(TOOL, operation)?;
        Ok(())
    }
}

#[async_trait]
impl VolumeManager for LvmManager {
    async fn exists(&self, vg_name: &str, lv_name: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Invocation::new("lvdisplay").arg(Self::lv_path(vg_name, lv_name)))
            .await?;
        Ok(out.success())
    }

    async fn create(&self, spec: &LvSpec) -> Result<String> {
        let path = Self::lv_path(&spec.vg_name, &spec.lv_name);
        if self.exists(&spec.vg_name, &spec.lv_name).await? {
            return Err(Error::exists("LogicalVolume", path));
        }

        let size = format!("{}G", spec.size_gib);
        let invocation = match &spec.thinpool {
            Some(pool) => Invocation::new("lvcreate").args([
                "-V".to_string(),
                size,
                "-T".to_string(),
                format!("{}/{}", spec.vg_name, pool),
                "-n".to_string(),
                spec.lv_name.clone(),
            ]),
            None => Invocation::new("lvcreate").args([
                "-L",
                &size,
                "-n",
                &spec.lv_name,
                &spec.vg_name,
            ]),
        };
        self.lvcreate(invocation, "create logical volume").await?;

        info!(
            "Created {} logical volume {} ({} GiB)",
            if spec.thinpool.is_some() { "thin" } else { "thick" },
            path,
            spec.size_gib
        );
        Ok(path)
    }

    async fn resize(&self, vg_name: &str, lv_name: &str, new_size_gib: u64) -> Result<()> {
        let path = Self::lv_path(vg_name, lv_name);
        if !self.exists(vg_name, lv_name).await? {
            return Err(Error::not_found("LogicalVolume", path));
        }

        self.runner
            .run(&Invocation::new("lvextend").args(["-L", &format!("{}G", new_size_gib), &path]))
            .await?
            .check(TOOL, "extend logical volume")?;
        info!("Extended {} to {} GiB", path, new_size_gib);
        Ok(())
    }

    async fn delete(&self, vg_name: &str, lv_name: &str) -> Result<()> {
        let path = Self::lv_path(vg_name, lv_name);
        if !self.exists(vg_name, lv_name).await? {
            debug!("Logical volume {} not present, nothing to delete", path);
            return Ok(());
        }

        self.runner
            .run(&Invocation::new("lvremove").args(["-f", &path]))
            .await?
            .check(TOOL, "remove logical volume")?;
        info!("Removed logical volume {}", path);
        Ok(())
    }

    async fn snapshot(&self, vg_name: &str, source_lv: &str, snap_lv: &str) -> Result<String> {
        if !self.exists(vg_name, source_lv).await? {
            return Err(Error::not_found(
                "LogicalVolume",
                Self::lv_path(vg_name, source_lv),
            ));
        }
        let path = Self::lv_path(vg_name, snap_lv);
        if self.exists(vg_name, snap_lv).await? {
            return Err(Error::exists("LogicalVolume", path));
        }

        self.lvcreate(
            Invocation::new("lvcreate").args([
                "-s",
                "-n",
                snap_lv,
                &format!("{}/{}", vg_name, source_lv),
            ]),
            "create snapshot",
        )
        .await?;
        info!("Created snapshot {} of {}", path, source_lv);
        Ok(path)
    }

    async fn clone_from_snapshot(
        &self,
        vg_name: &str,
        snap_lv: &str,
        clone_lv: &str,
    ) -> Result<String> {
        if !self.exists(vg_name, snap_lv).await? {
            return Err(Error::not_found(
                "LogicalVolume",
                Self::lv_path(vg_name, snap_lv),
            ));
        }
        let path = Self::lv_path(vg_name, clone_lv);
        if self.exists(vg_name, clone_lv).await? {
            return Err(Error::exists("LogicalVolume", path));
        }

        // Thin snapshots skip activation by default; a clone must be usable
        self.lvcreate(
            Invocation::new("lvcreate").args([
                "-s",
                "-kn",
                "-n",
                clone_lv,
                &format!("{}/{}", vg_name, snap_lv),
            ]),
            "create clone",
        )
        .await?;
        info!("Created clone {} from snapshot {}", path, snap_lv);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::FakeRunner;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Runner whose `lvdisplay` answers from a set of existing paths
    fn runner_with(existing: &[&str]) -> Arc<FakeRunner> {
        let existing: Arc<Mutex<BTreeSet<String>>> =
            Arc::new(Mutex::new(existing.iter().map(|s| s.to_string()).collect()));
        FakeRunner::new(move |argv| {
            if argv[0] == "lvdisplay" {
                if existing.lock().contains(&argv[1]) {
                    CommandOutput::ok("--- Logical volume ---")
                } else {
                    CommandOutput::failed(5, "Failed to find logical volume")
                }
            } else {
                CommandOutput::ok("")
            }
        })
    }

    fn spec(thinpool: Option<&str>) -> LvSpec {
        LvSpec {
            vg_name: "vg_pool_01".into(),
            lv_name: "vol_tenantA_vol1".into(),
            size_gib: 100,
            thinpool: thinpool.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_create_thin_and_thick() {
        let runner = runner_with(&[]);
        let lvm = LvmManager::new(runner.clone());

        let path = lvm.create(&spec(Some("pool"))).await.unwrap();
        assert_eq!(path, "/dev/vg_pool_01/vol_tenantA_vol1");
        lvm.create(&spec(None)).await.unwrap();

        assert_eq!(
            runner.calls_starting_with("lvcreate"),
            vec![
                "lvcreate -V 100G -T vg_pool_01/pool -n vol_tenantA_vol1",
                "lvcreate -L 100G -n vol_tenantA_vol1 vg_pool_01",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_existing_is_conflict() {
        let runner = runner_with(&["/dev/vg_pool_01/vol_tenantA_vol1"]);
        let lvm = LvmManager::new(runner.clone());

        let err = lvm.create(&spec(Some("pool"))).await.unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });
        assert!(runner.calls_starting_with("lvcreate").is_empty());
    }

    #[tokio::test]
    async fn test_resize_and_delete() {
        let runner = runner_with(&["/dev/vg_pool_01/vol_tenantA_vol1"]);
        let lvm = LvmManager::new(runner.clone());

        lvm.resize("vg_pool_01", "vol_tenantA_vol1", 200).await.unwrap();
        assert_eq!(
            runner.calls_starting_with("lvextend"),
            vec!["lvextend -L 200G /dev/vg_pool_01/vol_tenantA_vol1"]
        );

        let err = lvm.resize("vg_pool_01", "missing", 10).await.unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });

        // Absent volume: no lvremove issued
        lvm.delete("vg_pool_01", "missing").await.unwrap();
        lvm.delete("vg_pool_01", "vol_tenantA_vol1").await.unwrap();
        assert_eq!(
            runner.calls_starting_with("lvremove"),
            vec!["lvremove -f /dev/vg_pool_01/vol_tenantA_vol1"]
        );
    }

    #[tokio::test]
    async fn test_snapshot_and_clone() {
        let runner = runner_with(&[
            "/dev/vg_pool_01/vol_tenantA_vol1",
            "/dev/vg_pool_01/vol_tenantA_vol1_snap_daily",
        ]);
        let lvm = LvmManager::new(runner.clone());

        let err = lvm
            .snapshot("vg_pool_01", "vol_tenantA_vol1", "vol_tenantA_vol1_snap_daily")
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });

        let err = lvm
            .snapshot("vg_pool_01", "vol_tenantA_nope", "vol_tenantA_nope_snap_x")
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });

        lvm.snapshot("vg_pool_01", "vol_tenantA_vol1", "vol_tenantA_vol1_snap_hourly")
            .await
            .unwrap();
        let clone = lvm
            .clone_from_snapshot("vg_pool_01", "vol_tenantA_vol1_snap_daily", "vol_tenantA_copy")
            .await
            .unwrap();
        assert_eq!(clone, "/dev/vg_pool_01/vol_tenantA_copy");

        assert_eq!(
            runner.calls_starting_with("lvcreate"),
            vec![
                "lvcreate -s -n vol_tenantA_vol1_snap_hourly vg_pool_01/vol_tenantA_vol1",
                "lvcreate -s -kn -n vol_tenantA_copy vg_pool_01/vol_tenantA_vol1_snap_daily",
            ]
        );
    }

    #[tokio::test]
    async fn test_lvcreate_failure_carries_stderr() {
        let runner = FakeRunner::new(|argv| match argv[0].as_str() {
            "lvdisplay" => CommandOutput::failed(5, ""),
            _ => CommandOutput::failed(5, "  Volume group \"vg_pool_01\" has insufficient free space\n"),
        });
        let lvm = LvmManager::new(runner);

        let err = lvm.create(&spec(None)).await.unwrap_err();
        assert_matches!(
            err,
            Error::CommandFailed { ref stderr, .. } if stderr.contains("insufficient free space")
        );
    }
}
