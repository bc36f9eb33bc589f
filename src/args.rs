use crate::batch::BatchFlags;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rsync-mapper")]
#[command(version, about, long_about = None)]
/// Simple wrapper for rsync to allow ease of many paths or an interactive
/// experience with confirmation dialogs.
pub struct Args {
    /// Skip any confirmation dialogs
    #[clap(long = "no-confirm")]
    pub no_confirm: bool,

    /// Skip the initial sync src -> dst
    #[clap(long = "no-sync")]
    pub no_sync: bool,

    /// Only update certain file paths based on user choice
    #[clap(short, long)]
    pub interactive: bool,

    /// Sync src -> dst, then dst -> src
    #[clap(long)]
    pub mirror: bool,

    /// Delete files on remote not on source (after sync, unless also --no-sync)
    #[clap(long)]
    pub delete: bool,

    /// Delete files on source not on remote (after sync, unless also --no-sync)
    #[clap(long)]
    pub tidy: bool,

    /// Files to sync together
    #[clap(long, default_value = "filesMap.json")]
    pub map: String,

    /// The rsync executable to run
    #[clap(long, default_value = "rsync")]
    pub rsync: String,

    /// Give up after this many failed attempts with --no-confirm (default: never)
    #[clap(long)]
    pub retries: Option<u32>,

    /// Longest wait between retries, in seconds
    #[clap(long = "backoff-max", default_value_t = 600)]
    pub backoff_max: u64,

    /// ZFS pool that must be imported before syncing
    #[clap(long)]
    pub pool: Option<String>,

    /// Log what is being run
    #[clap(short, long)]
    pub verbose: bool,

    /// Log everything
    #[clap(long)]
    pub debug: bool,
}

impl Args {
    /// Rejects flag combinations that make no sense together.
    pub fn validate(&self) -> Result<()> {
        if self.interactive && (self.mirror || self.delete || self.tidy || self.no_sync) {
            bail!("Cannot use --interactive with --mirror, --delete, --tidy, or --no-sync");
        }

        if self.mirror && (self.delete || self.tidy) {
            bail!("Cannot --delete or --tidy with --mirror together");
        }

        if self.delete && self.tidy {
            bail!("Cannot --delete and --tidy together");
        }

        Ok(())
    }

    pub fn batch_flags(&self) -> BatchFlags {
        BatchFlags {
            confirm: !self.no_confirm,
            sync: !self.no_sync,
            mirror: self.mirror,
            delete: self.delete,
            tidy: self.tidy,
            retries: self.retries,
        }
    }

    /// Default filter directive for the log subscriber.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

pub fn get_env_args() -> Result<Args> {
    let args = Args::parse();
    args.validate()?;
    Ok(args)
}
