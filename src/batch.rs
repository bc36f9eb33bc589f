use crate::{
    mapping::{MappingModel, SyncLink},
    readiness::{preflight, Readiness},
    rsync::{Rsync, SyncOptions},
};

use anyhow::Result;
use tracing::info;

/// What batch mode does to every link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchFlags {
    /// Preview and confirm every change.
    pub confirm: bool,
    /// Sync source -> destination.
    pub sync: bool,
    /// Also sync destination -> source.
    pub mirror: bool,
    /// Remove files on the destination that are gone from the source.
    pub delete: bool,
    /// Remove files on the source that are gone from the destination.
    pub tidy: bool,
    /// Retry budget when not confirming, `None` for unlimited.
    pub retries: Option<u32>,
}

impl Default for BatchFlags {
    fn default() -> Self {
        Self {
            confirm: true,
            sync: true,
            mirror: false,
            delete: false,
            tidy: false,
            retries: None,
        }
    }
}

/// Walks every link of `model` in order and applies `flags` to it.
pub fn run(
    rsync: &mut Rsync,
    model: &MappingModel,
    flags: &BatchFlags,
    hook: Option<&mut dyn Readiness>,
) -> Result<()> {
    preflight(hook)?;

    info!(links = model.len(), ?flags, "starting batch run");
    for link in model.links() {
        if flags.confirm {
            confirmed(rsync, link, flags)?;
        } else {
            unconfirmed(rsync, link, flags)?;
        }
    }

    Ok(())
}

fn confirmed(rsync: &mut Rsync, link: &SyncLink, flags: &BatchFlags) -> Result<()> {
    if flags.mirror {
        rsync.safe_sync(link)?;
        if flags.sync {
            rsync.safe_sync(&link.reversed())?;
        }
        return Ok(());
    }

    if flags.sync {
        rsync.safe_sync(link)?;
    }
    if flags.delete {
        rsync.safe_remove(link)?;
    } else if flags.tidy {
        rsync.safe_remove(&link.reversed())?;
    }

    Ok(())
}

fn unconfirmed(rsync: &mut Rsync, link: &SyncLink, flags: &BatchFlags) -> Result<()> {
    let opts = SyncOptions::default().retries(flags.retries);

    if flags.sync || flags.mirror {
        rsync.sync_print(link, opts)?;
    }

    if flags.mirror {
        rsync.sync_print(&link.reversed(), opts)?;
    } else if flags.delete {
        rsync.sync_print(link, opts.delete(true))?;
    } else if flags.tidy {
        rsync.sync_print(&link.reversed(), opts.delete(true))?;
    }

    Ok(())
}
