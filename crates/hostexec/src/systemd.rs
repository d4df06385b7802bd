//! Init-system client built on `systemctl`.

use crate::error::Result;
use crate::runner::{CommandRunner, Invocation};
use std::path::{Path, PathBuf};

/// Client for querying and stopping systemd units.
pub struct SystemdClient<'a> {
    runner: &'a dyn CommandRunner,
    systemctl: PathBuf,
}

impl<'a> SystemdClient<'a> {
    /// Create a client using the given `systemctl` binary.
    pub fn new(runner: &'a dyn CommandRunner, systemctl: impl AsRef<Path>) -> Self {
        Self {
            runner,
            systemctl: systemctl.as_ref().to_path_buf(),
        }
    }

    /// Whether `unit` is active.
    ///
    /// Runs `systemctl is-active <unit>`; any failure, including a unit that
    /// does not exist or a `systemctl` that cannot be started, reads as inactive.
    pub fn is_active(&self, unit: &str) -> bool {
        let invocation = Invocation::new(&self.systemctl).args(["is-active", unit]);
        self.runner.succeeds(&invocation)
    }

    /// Stop `unit` if it is active. Stopping an inactive unit does nothing.
    pub fn stop(&self, unit: &str) -> Result<()> {
        if !self.is_active(unit) {
            log::info!("{unit:?} is not active, ignoring");
            return Ok(());
        }

        log::info!("{unit:?} is active, stopping...");
        let invocation = Invocation::new(&self.systemctl).args(["stop", unit]);
        self.runner.run(&invocation)?;
        log::info!("{unit:?} stopped");
        Ok(())
    }
}
