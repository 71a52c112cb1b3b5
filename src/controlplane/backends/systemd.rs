//! systemd Service Adapter

use crate::domain::ports::{CommandRunnerRef, ServiceManager};
use crate::error::Result;
use crate::exec::Invocation;
use async_trait::async_trait;
use tracing::{debug, info};

const TOOL: &str = "systemctl";

/// `systemctl` exit code for a unit that is not loaded
const EXIT_UNIT_NOT_LOADED: i32 = 5;

/// [`ServiceManager`] backed by `systemctl`
pub struct SystemdServiceManager {
    runner: CommandRunnerRef,
}

impl SystemdServiceManager {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    fn systemctl(verb: &str, unit: &str) -> Invocation {
        Invocation::new(TOOL).args([verb, unit])
    }
}

#[async_trait]
impl ServiceManager for SystemdServiceManager {
    async fn start(&self, unit: &str) -> Result<()> {
        self.runner
            .run(&Self::systemctl("start", unit))
            .await?
            .check(TOOL, &format!("start {}", unit))?;
        info!("Started {}", unit);
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        let out = self.runner.run(&Self::systemctl("stop", unit)).await?;
        if out.exit_code == EXIT_UNIT_NOT_LOADED {
            debug!("{} not loaded, treating as stopped", unit);
            return Ok(());
        }
        out.check(TOOL, &format!("stop {}", unit))?;
        info!("Stopped {}", unit);
        Ok(())
    }

    async fn reload(&self, unit: &str) -> Result<()> {
        self.runner
            .run(&Self::systemctl("reload", unit))
            .await?
            .check(TOOL, &format!("reload {}", unit))?;
        debug!("Reloaded {}", unit);
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        let out = self
            .runner
            .run(&Invocation::new(TOOL).args(["is-active", "--quiet", unit]))
            .await?;
        Ok(out.success())
    }
}
