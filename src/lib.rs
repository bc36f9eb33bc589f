pub use anyhow::{anyhow, Context, Result};

/// Provides support to parse and validate the command line.
pub mod args;
/// Provides support to walk the whole file map without per path interaction.
pub mod batch;
/// Provides support to prompt the user and read answers line by line.
pub mod console;
/// Provides support to pick paths from the file map and act on them.
pub mod interactive;
/// Provides support to represent the hosts and directories to keep in sync.
pub mod mapping;
/// Provides support to check preconditions, like an imported storage pool.
pub mod readiness;
/// Provides support to invoke rsync with retries and read what it changed.
pub mod rsync;
/// Provides support to run shell commands with an optional timeout.
pub mod runner;
/// Provides support to preview, confirm and apply syncs and removals.
pub mod safe;
/// Provides support to expand user supplied paths.
pub mod utils;
