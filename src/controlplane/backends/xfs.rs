//! XFS Filesystem Adapter

use crate::domain::ports::{CommandRunnerRef, FilesystemManager, MountKind};
use crate::error::{Error, Result};
use crate::exec::Invocation;
use async_trait::async_trait;
use tracing::{debug, info};

const TOOL: &str = "xfs";

/// mkfs.xfs geometry tuned for large NFS volumes on thin pools
pub const MKFS_OPTIONS: &[&str] = &[
    "-b",
    "size=4096",
    "-m",
    "crc=1,finobt=1",
    "-i",
    "size=512,maxpct=25",
    "-d",
    "agcount=32,su=256k,sw=1",
];

/// Mount options for every exported volume
pub const MOUNT_OPTIONS: &str = "rw,noatime,nodiratime,logbsize=256k,inode64";

/// [`FilesystemManager`] backed by xfsprogs and util-linux
pub struct XfsManager {
    runner: CommandRunnerRef,
}

impl XfsManager {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    fn mount_options(kind: MountKind) -> String {
        match kind {
            MountKind::Fresh => MOUNT_OPTIONS.to_string(),
            // Clones carry their origin's filesystem UUID
            MountKind::Clone => format!("{},nouuid", MOUNT_OPTIONS),
        }
    }
}

#[async_trait]
impl FilesystemManager for XfsManager {
    async fn format(&self, device: &str) -> Result<()> {
        let blkid = self.runner.run(&Invocation::new("blkid").arg(device)).await?;
        if blkid.success() && blkid.stdout.to_ascii_lowercase().contains("xfs") {
            debug!("{} already carries an XFS signature", device);
            return Ok(());
        }

        self.runner
            .run(&Invocation::new("mkfs.xfs").args(MKFS_OPTIONS.iter().copied()).arg(device))
            .await?
            .check(TOOL, "format device")?;
        info!("Formatted {} as XFS", device);
        Ok(())
    }

    async fn is_mounted(&self, mount_point: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Invocation::new("mountpoint").args(["-q", mount_point]))
            .await?;
        Ok(out.success())
    }

    async fn mount(&self, device: &str, mount_point: &str, kind: MountKind) -> Result<()> {
        tokio::fs::create_dir_all(mount_point).await?;

        if self.is_mounted(mount_point).await? {
            debug!("{} already mounted", mount_point);
            return Ok(());
        }

        self.runner
            .run(&Invocation::new("mount").args([
                "-o",
                &Self::mount_options(kind),
                device,
                mount_point,
            ]))
            .await?
            .check(TOOL, "mount filesystem")?;
        info!("Mounted {} at {}", device, mount_point);
        Ok(())
    }

    async fn unmount(&self, mount_point: &str) -> Result<()> {
        if !self.is_mounted(mount_point).await? {
            debug!("{} not mounted, nothing to unmount", mount_point);
            return Ok(());
        }

        self.runner
            .run(&Invocation::new("umount").arg(mount_point))
            .await?
            .check(TOOL, "unmount filesystem")?;
        info!("Unmounted {}", mount_point);
        Ok(())
    }

    async fn grow(&self, mount_point: &str) -> Result<()> {
        if !self.is_mounted(mount_point).await? {
            return Err(Error::command_failed(
                TOOL,
                "grow filesystem",
                format!("{} is not mounted", mount_point),
            ));
        }

        self.runner
            .run(&Invocation::new("xfs_growfs").arg(mount_point))
            .await?
            .check(TOOL, "grow filesystem")?;
        info!("Grew filesystem at {}", mount_point);
        Ok(())
    }
}
