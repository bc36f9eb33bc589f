use crate::runner::{CommandRunner, DEFAULT_TIMEOUT};

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pre-flight check that must pass before any link is synced.
pub trait Readiness {
    /// Whether the precondition already holds.
    fn is_ready(&mut self) -> Result<bool>;

    /// Attempts to make the precondition hold. Returns `false` on failure.
    fn prepare(&mut self) -> Result<bool>;

    /// Short human readable name used in messages.
    fn describe(&self) -> String;
}

/// Makes sure `hook`, if any, is satisfied, preparing it once if needed.
pub fn preflight(hook: Option<&mut dyn Readiness>) -> Result<()> {
    let Some(hook) = hook else {
        return Ok(());
    };

    if hook.is_ready()? {
        debug!(check = %hook.describe(), "already ready");
        return Ok(());
    }

    info!(check = %hook.describe(), "not ready, preparing");
    if hook.prepare()? && hook.is_ready()? {
        return Ok(());
    }

    bail!("{} is not available", hook.describe())
}

/// Importing a pool can take a while on spinning disks.
const IMPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// A ZFS storage pool that has to be imported before its datasets can be
/// used as sync endpoints.
pub struct ZfsPool<R: CommandRunner> {
    name: String,
    runner: R,
}

impl<R: CommandRunner> ZfsPool<R> {
    pub fn new(name: &str, runner: R) -> Self {
        Self {
            name: name.to_string(),
            runner,
        }
    }
}

impl<R: CommandRunner> Readiness for ZfsPool<R> {
    fn is_ready(&mut self) -> Result<bool> {
        let res = self.runner.run(
            &format!("zpool list -H -o name {}", self.name),
            Some(DEFAULT_TIMEOUT),
        )?;
        Ok(res.success() && res.stdout.lines().any(|l| l.trim() == self.name))
    }

    fn prepare(&mut self) -> Result<bool> {
        let res = self
            .runner
            .run(&format!("zpool import {}", self.name), Some(IMPORT_TIMEOUT))?;
        if !res.success() {
            warn!(pool = %self.name, output = %res.stdout, "zpool import failed");
        }
        Ok(res.success())
    }

    fn describe(&self) -> String {
        format!("storage pool {}", self.name)
    }
}
