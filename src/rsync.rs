use crate::{
    console::{get_confirmation, Console},
    mapping::SyncLink,
    runner::CommandRunner,
};

use anyhow::Result;
use std::{thread, time::Duration};
use tracing::{debug, info, warn};

/// First delay between retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(4);
/// Default ceiling for the delay between retries.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(600);

/// Result of one sync invocation.
///
/// `Aborted` (connection failure the user gave up on, or an exhausted retry
/// budget) is distinct from `NoChanges` (the tool ran and had nothing to do).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Aborted,
    NoChanges,
    Changed(Vec<String>),
}

impl SyncOutcome {
    fn from_files(files: Vec<String>) -> Self {
        if files.is_empty() {
            SyncOutcome::NoChanges
        } else {
            SyncOutcome::Changed(files)
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SyncOutcome::Aborted)
    }
}

/// Exponential delay between retries: doubles after every use, never above
/// `max`.
///
/// # Example
///
/// ```rust
/// use rsync_mapper::rsync::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(Duration::from_secs(4), Duration::from_secs(10));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(4));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(8));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Attempt counter and backoff for one [`Rsync::invoke`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    backoff: Backoff,
}

impl RetryState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            attempts: 0,
            backoff,
        }
    }

    /// Whether another attempt fits in `retries` (`None` is unlimited).
    pub fn may_attempt(&self, retries: Option<u32>) -> bool {
        retries.map_or(true, |max| self.attempts < max)
    }

    /// Counts one attempt and returns the running total. The count sticks at
    /// `u32::MAX` when retrying forever.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }
}

/// Per call knobs of [`Rsync::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub delete: bool,
    /// `None` retries forever.
    pub retries: Option<u32>,
    /// Sleep between failed attempts.
    pub backoff: bool,
    /// Ask the user before every retry.
    pub confirm: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            delete: false,
            retries: None,
            backoff: true,
            confirm: false,
        }
    }
}

impl SyncOptions {
    /// Options used by the confirmation driven operations: no sleeping, the
    /// user decides whether to retry.
    pub fn interactive() -> Self {
        Self {
            backoff: false,
            confirm: true,
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn retries(mut self, retries: Option<u32>) -> Self {
        self.retries = retries;
        self
    }
}

/// Drives the external rsync executable.
pub struct Rsync<'a> {
    runner: &'a mut dyn CommandRunner,
    console: &'a mut dyn Console,
    program: String,
    backoff_max: Duration,
    sleep: fn(Duration),
}

impl<'a> Rsync<'a> {
    pub fn new(runner: &'a mut dyn CommandRunner, console: &'a mut dyn Console) -> Self {
        Self {
            runner,
            console,
            program: String::from("rsync"),
            backoff_max: DEFAULT_BACKOFF_MAX,
            sleep: thread::sleep,
        }
    }

    /// Executable to run instead of `rsync` from `$PATH`.
    pub fn program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Replaces the function used to wait between retries.
    pub fn sleeper(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn console(&mut self) -> &mut dyn Console {
        &mut *self.console
    }

    pub fn command_line(&self, link: &SyncLink, opts: &SyncOptions) -> String {
        format!(
            "{} -azv {}{}{} {}",
            self.program,
            if opts.dry_run { "--dry-run " } else { "" },
            if opts.delete { "--delete " } else { "" },
            link.source,
            link.destination
        )
    }

    /// Runs rsync for `link` until it succeeds, the user declines to retry or
    /// the retry budget runs out.
    pub fn invoke(&mut self, link: &SyncLink, opts: SyncOptions) -> Result<SyncOutcome> {
        let cmd = self.command_line(link, &opts);
        let mut state = RetryState::new(Backoff::new(INITIAL_BACKOFF, self.backoff_max));

        while state.may_attempt(opts.retries) {
            let attempt = state.record_attempt();

            self.console.say(&format!("CMD: {cmd}"));
            let res = self.runner.run(&cmd, None)?;

            if res.success() {
                let files = parse_changed_files(&res.stdout);
                debug!(count = files.len(), dry_run = opts.dry_run, "rsync finished");
                return Ok(SyncOutcome::from_files(files));
            }

            warn!(exit_code = res.exit_code, attempt, "rsync failed");
            self.console.say(&format!("Connection error: {}", res.stdout));

            if opts.confirm
                && !get_confirmation(&mut *self.console, "Try again? y/n: ", "Aborting", "")?
            {
                info!("retry declined, aborting");
                return Ok(SyncOutcome::Aborted);
            }

            if opts.backoff {
                let delay = state.next_delay();
                info!(?delay, "waiting before retry");
                (self.sleep)(delay);
            }
        }

        warn!(tries = state.attempts(), "retry budget exhausted, aborting");
        Ok(SyncOutcome::Aborted)
    }
}

/// Extracts the itemized file list from rsync's verbose output.
///
/// The first line is a header and is skipped. File lines run until the first
/// blank line, after which comes the transfer summary. Without a blank line
/// every line after the header counts.
///
/// # Example
///
/// ```rust
/// use rsync_mapper::rsync::parse_changed_files;
///
/// let out = "sending incremental file list\na.txt\nb.txt\n\nsent 123 bytes";
/// assert_eq!(parse_changed_files(out), vec!["a.txt", "b.txt"]);
/// ```
pub fn parse_changed_files(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        console::test::ScriptedConsole,
        mapping::SyncEndpoint,
        runner::{test::ScriptedRunner, CommandResult},
    };
    use std::cell::RefCell;

    thread_local! {
        static SLEPT: RefCell<Vec<Duration>> = const { RefCell::new(Vec::new()) };
    }

    fn record_sleep(delay: Duration) {
        SLEPT.with(|s| s.borrow_mut().push(delay));
    }

    fn slept() -> Vec<u64> {
        SLEPT.with(|s| s.borrow().iter().map(|d| d.as_secs()).collect())
    }

    fn link() -> SyncLink {
        SyncLink::new(
            SyncEndpoint::local("~/music/"),
            SyncEndpoint::remote("nas", "/tank/music"),
        )
    }

    fn failure() -> CommandResult {
        CommandResult::new("ssh: connect to host nas port 22: Connection refused", 255)
    }

    #[test]
    fn test_parse_changed_files() {
        let out = "receiving file list ...\nfileA.txt\nfileB.txt\n\nsent 123 bytes ...";
        assert_eq!(parse_changed_files(out), vec!["fileA.txt", "fileB.txt"]);
    }

    #[test]
    fn test_parse_without_summary_keeps_all_lines() {
        let out = "sending incremental file list\na\nb";
        assert_eq!(parse_changed_files(out), vec!["a", "b"]);
        assert!(parse_changed_files("").is_empty());
        assert!(parse_changed_files("sending incremental file list").is_empty());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(INITIAL_BACKOFF, DEFAULT_BACKOFF_MAX);
        let delays: Vec<u64> = (0..12).map(|_| backoff.next_delay().as_secs()).collect();

        assert_eq!(
            delays,
            vec![4, 8, 16, 32, 64, 128, 256, 512, 600, 600, 600, 600]
        );
    }

    #[test]
    fn test_retry_state_budget_and_saturation() {
        let mut state = RetryState::new(Backoff::new(INITIAL_BACKOFF, DEFAULT_BACKOFF_MAX));
        assert!(state.may_attempt(Some(1)));
        assert_eq!(state.record_attempt(), 1);
        assert!(!state.may_attempt(Some(1)));
        assert!(state.may_attempt(None));

        state.attempts = u32::MAX - 1;
        assert_eq!(state.record_attempt(), u32::MAX);
        assert_eq!(state.record_attempt(), u32::MAX);
        assert!(state.may_attempt(None));
        assert_eq!(state.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn test_command_line() {
        let mut runner = ScriptedRunner::default();
        let mut console = ScriptedConsole::default();
        let rsync = Rsync::new(&mut runner, &mut console);

        assert_eq!(
            rsync.command_line(&link(), &SyncOptions::default()),
            "rsync -azv ~/music/ nas:/tank/music"
        );
        assert_eq!(
            rsync.command_line(&link(), &SyncOptions::default().dry_run(true).delete(true)),
            "rsync -azv --dry-run --delete ~/music/ nas:/tank/music"
        );
    }

    #[test]
    fn test_immediate_success_without_changes_is_not_aborted() {
        let mut runner = ScriptedRunner::new(vec![CommandResult::new(
            "sending incremental file list\n\nsent 10 bytes",
            0,
        )]);
        let mut console = ScriptedConsole::default();

        let outcome = Rsync::new(&mut runner, &mut console)
            .invoke(&link(), SyncOptions::default())
            .unwrap();

        assert_eq!(outcome, SyncOutcome::NoChanges);
        assert!(console.printed("CMD: rsync -azv ~/music/ nas:/tank/music"));
    }

    #[test]
    fn test_failures_back_off_then_succeed() {
        SLEPT.with(|s| s.borrow_mut().clear());
        let mut runner = ScriptedRunner::new(vec![
            failure(),
            failure(),
            failure(),
            CommandResult::new("header\nsong.flac\n\nsent", 0),
        ]);
        let mut console = ScriptedConsole::default();

        let outcome = Rsync::new(&mut runner, &mut console)
            .sleeper(record_sleep)
            .invoke(&link(), SyncOptions::default())
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Changed(vec!["song.flac".into()]));
        assert_eq!(slept(), vec![4, 8, 16]);
        assert_eq!(runner.commands.len(), 4);
        assert!(console
            .output
            .iter()
            .any(|l| l.starts_with("Connection error: ssh: connect")));
    }

    #[test]
    fn test_backoff_ceiling_is_configurable() {
        SLEPT.with(|s| s.borrow_mut().clear());
        let mut runner = ScriptedRunner::new(vec![failure(), failure(), failure()]);
        let mut console = ScriptedConsole::default();

        let outcome = Rsync::new(&mut runner, &mut console)
            .backoff_max(Duration::from_secs(5))
            .sleeper(record_sleep)
            .invoke(&link(), SyncOptions::default().retries(Some(3)))
            .unwrap();

        assert!(outcome.is_aborted());
        assert_eq!(slept(), vec![4, 5, 5]);
    }

    #[test]
    fn test_exhausted_retries_abort() {
        let mut runner = ScriptedRunner::new(vec![failure(), failure()]);
        let mut console = ScriptedConsole::default();

        let opts = SyncOptions {
            backoff: false,
            ..SyncOptions::default().retries(Some(2))
        };
        let outcome = Rsync::new(&mut runner, &mut console)
            .invoke(&link(), opts)
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Aborted);
        assert_eq!(runner.commands.len(), 2);
    }

    #[test]
    fn test_zero_retries_never_runs() {
        let mut runner = ScriptedRunner::default();
        let mut console = ScriptedConsole::default();

        let outcome = Rsync::new(&mut runner, &mut console)
            .invoke(&link(), SyncOptions::default().retries(Some(0)))
            .unwrap();

        assert!(outcome.is_aborted());
        assert!(runner.commands.is_empty());
    }

    #[test]
    fn test_declining_retry_aborts_immediately() {
        let mut runner = ScriptedRunner::new(vec![failure(), failure()]);
        let mut console = ScriptedConsole::new(&["y", "n"]);

        let outcome = Rsync::new(&mut runner, &mut console)
            .sleeper(|_| panic!("interactive retries never sleep"))
            .invoke(&link(), SyncOptions::interactive().dry_run(true))
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Aborted);
        assert_eq!(runner.commands.len(), 2);
        assert!(console.printed("Aborting"));
        assert!(runner.results.is_empty());
    }
}
