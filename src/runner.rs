use anyhow::{Context, Result};
use std::{
    io::{self, Read},
    os::unix::process::CommandExt,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Default timeout for short auxiliary commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Exit code reported when the process did not exit on its own (killed after
/// a timeout or terminated by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// How often a bounded wait polls the child for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output of a single command invocation.
///
/// Stderr is redirected into stdout before the command runs, so `stderr` is
/// normally `None`. It is kept apart for commands that write to it anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: Option<String>,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: None,
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The execution primitive everything else is built on.
///
/// `timeout` of `None` waits indefinitely. Implementations never retry and
/// never interpret the output.
pub trait CommandRunner {
    fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<CommandResult>;
}

/// Runs commands through `sh -c` with stderr folded into stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        debug!(command, ?timeout, "spawning");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{command}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Bounded commands get their own process group so a timeout can take
        // down everything the shell started. Unbounded ones (rsync) stay in
        // the foreground group to keep terminal prompts and Ctrl-C working.
        if timeout.is_some() {
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {command:?}"))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match timeout {
            None => child.wait().context("Failed to wait for command")?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait().context("Failed to poll command")? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        warn!(command, ?limit, "command timed out, killing it");
                        // The group may be gone between the poll and the kill.
                        let _ = kill_group(&child);
                        break child.wait().context("Failed to reap killed command")?;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        Ok(CommandResult {
            stdout: stdout.trim().to_string(),
            stderr: Some(stderr.trim().to_string()).filter(|s| !s.is_empty()),
            exit_code: status.code().unwrap_or(NO_EXIT_CODE),
        })
    }
}

/// Sends SIGKILL to the process group led by `child`.
fn kill_group(child: &Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: killpg only sends a signal, the group id comes from our own child.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // Partial output is still useful if the pipe breaks mid-read.
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
