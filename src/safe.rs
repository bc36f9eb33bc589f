use crate::{
    console::get_confirmation,
    mapping::SyncLink,
    rsync::{Rsync, SyncOptions, SyncOutcome},
};

use anyhow::Result;
use tracing::info;

impl Rsync<'_> {
    /// Previews `link` with a dry run and, if anything would change, asks
    /// before syncing for real.
    ///
    /// Returns `false` when the preview failed or the user said no. Once the
    /// user agrees, the outcome of the real run is not checked.
    pub fn safe_sync(&mut self, link: &SyncLink) -> Result<bool> {
        let opts = SyncOptions::interactive();

        let files = match self.invoke(link, opts.dry_run(true))? {
            SyncOutcome::Aborted => {
                self.console().say("failed to get files");
                return Ok(false);
            }
            SyncOutcome::NoChanges => {
                self.console().say("No files to update.");
                return Ok(true);
            }
            SyncOutcome::Changed(files) => files,
        };

        self.console()
            .say("The following files have changed since last sync:");
        for file in &files {
            self.console().say(file);
        }

        if !get_confirmation(self.console(), "Sync files? y/n: ", "Not syncing", "")? {
            return Ok(false);
        }

        self.console().say("Syncing files...");
        let outcome = self.invoke(link, opts)?;
        info!(%link, applied = !outcome.is_aborted(), "sync applied");

        Ok(true)
    }

    /// Previews which files `--delete` would remove from the destination and,
    /// after an explicit confirmation, removes them.
    ///
    /// Returns `true` when there was nothing to remove or the removal ran.
    pub fn safe_remove(&mut self, link: &SyncLink) -> Result<bool> {
        let opts = SyncOptions::interactive().delete(true);

        let files = match self.invoke(link, opts.dry_run(true))? {
            SyncOutcome::Aborted => {
                self.console().say("failed to get files");
                return Ok(false);
            }
            SyncOutcome::NoChanges => {
                self.console().say("Nothing to remove");
                return Ok(true);
            }
            SyncOutcome::Changed(files) => files,
        };

        self.console().say("The following files are to be removed:");
        for file in &files {
            self.console().say(file);
        }

        if !get_confirmation(
            self.console(),
            "Confirm DELETION? Cannot be undone. y/n: ",
            "Not deleting",
            "",
        )? {
            return Ok(false);
        }

        Ok(!self.invoke(link, opts)?.is_aborted())
    }

    /// Runs `link` without any confirmation and prints what changed.
    pub fn sync_print(&mut self, link: &SyncLink, opts: SyncOptions) -> Result<SyncOutcome> {
        let outcome = self.invoke(link, opts)?;

        match &outcome {
            SyncOutcome::Aborted => self.console().say("Sync aborted"),
            SyncOutcome::NoChanges => self.console().say("No files changed"),
            SyncOutcome::Changed(files) => {
                self.console().say("Files changed:");
                for file in files {
                    self.console().say(file);
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        console::test::ScriptedConsole,
        mapping::{SyncEndpoint, SyncLink},
        rsync::{Rsync, SyncOptions, SyncOutcome},
        runner::{test::ScriptedRunner, CommandResult},
    };

    fn link() -> SyncLink {
        SyncLink::new(
            SyncEndpoint::local("~/docs/"),
            SyncEndpoint::remote("nas", "/tank/docs"),
        )
    }

    fn preview(files: &[&str]) -> CommandResult {
        let mut out = String::from("sending incremental file list\n");
        for f in files {
            out.push_str(f);
            out.push('\n');
        }
        out.push_str("\nsent 1,024 bytes  received 35 bytes");
        CommandResult::new(out, 0)
    }

    fn refused() -> CommandResult {
        CommandResult::new("ssh: Could not resolve hostname nas", 255)
    }

    #[test]
    fn test_safe_sync_nothing_to_do_never_prompts() {
        let mut runner = ScriptedRunner::new(vec![preview(&[])]);
        let mut console = ScriptedConsole::default();

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_sync(&link())
            .unwrap();

        assert!(ok);
        assert!(console.prompts.is_empty());
        assert!(console.printed("No files to update."));
        assert_eq!(runner.commands.len(), 1);
        assert!(runner.commands[0].contains("--dry-run"));
    }

    #[test]
    fn test_safe_remove_nothing_to_do_never_prompts() {
        let mut runner = ScriptedRunner::new(vec![preview(&[])]);
        let mut console = ScriptedConsole::default();

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_remove(&link())
            .unwrap();

        assert!(ok);
        assert!(console.prompts.is_empty());
        assert!(console.printed("Nothing to remove"));
        assert_eq!(
            runner.commands,
            vec!["rsync -azv --dry-run --delete ~/docs/ nas:/tank/docs"]
        );
    }

    #[test]
    fn test_safe_sync_aborted_preview_skips_apply() {
        let mut runner = ScriptedRunner::new(vec![refused()]);
        let mut console = ScriptedConsole::new(&["n"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_sync(&link())
            .unwrap();

        assert!(!ok);
        assert_eq!(runner.commands.len(), 1);
        assert!(console.printed("failed to get files"));
    }

    #[test]
    fn test_safe_sync_confirmed_applies_once() {
        let mut runner = ScriptedRunner::new(vec![
            preview(&["notes.md", "todo.txt"]),
            preview(&["notes.md", "todo.txt"]),
        ]);
        let mut console = ScriptedConsole::new(&["y"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_sync(&link())
            .unwrap();

        assert!(ok);
        assert!(console.printed("notes.md"));
        assert!(console.printed("todo.txt"));
        assert_eq!(console.prompts, vec!["Sync files? y/n: "]);
        assert_eq!(
            runner.commands,
            vec![
                "rsync -azv --dry-run ~/docs/ nas:/tank/docs",
                "rsync -azv ~/docs/ nas:/tank/docs",
            ]
        );
    }

    #[test]
    fn test_safe_sync_declined_has_no_side_effects() {
        let mut runner = ScriptedRunner::new(vec![preview(&["a"])]);
        let mut console = ScriptedConsole::new(&["n"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_sync(&link())
            .unwrap();

        assert!(!ok);
        assert_eq!(runner.commands.len(), 1);
        assert!(console.printed("Not syncing"));
    }

    #[test]
    fn test_safe_sync_ignores_apply_failure() {
        let mut runner = ScriptedRunner::new(vec![preview(&["a"]), refused()]);
        let mut console = ScriptedConsole::new(&["y", "n"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_sync(&link())
            .unwrap();

        assert!(ok);
    }

    #[test]
    fn test_safe_remove_checks_apply_result() {
        let mut runner = ScriptedRunner::new(vec![preview(&["deleting old.log"]), refused()]);
        let mut console = ScriptedConsole::new(&["y", "n"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_remove(&link())
            .unwrap();

        assert!(!ok);
        assert_eq!(
            console.prompts,
            vec!["Confirm DELETION? Cannot be undone. y/n: ", "Try again? y/n: "]
        );
        assert_eq!(runner.commands[1], "rsync -azv --delete ~/docs/ nas:/tank/docs");
    }

    #[test]
    fn test_safe_remove_confirmed() {
        let mut runner = ScriptedRunner::new(vec![
            preview(&["deleting old.log"]),
            preview(&["deleting old.log"]),
        ]);
        let mut console = ScriptedConsole::new(&["y"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_remove(&link())
            .unwrap();

        assert!(ok);
        assert!(console.printed("The following files are to be removed:"));
        assert!(console.printed("deleting old.log"));
    }

    #[test]
    fn test_safe_remove_aborted_preview() {
        let mut runner = ScriptedRunner::new(vec![refused()]);
        let mut console = ScriptedConsole::new(&["n"]);

        let ok = Rsync::new(&mut runner, &mut console)
            .safe_remove(&link())
            .unwrap();

        assert!(!ok);
        assert_eq!(runner.commands.len(), 1);
    }

    #[test]
    fn test_sync_print_reports() {
        let mut runner = ScriptedRunner::new(vec![preview(&["x.txt"]), preview(&[])]);
        let mut console = ScriptedConsole::default();
        let mut rsync = Rsync::new(&mut runner, &mut console);

        let first = rsync.sync_print(&link(), SyncOptions::default()).unwrap();
        let second = rsync.sync_print(&link(), SyncOptions::default()).unwrap();
        drop(rsync);

        assert_eq!(first, SyncOutcome::Changed(vec!["x.txt".into()]));
        assert_eq!(second, SyncOutcome::NoChanges);
        assert!(console.printed("Files changed:"));
        assert!(console.printed("No files changed"));
    }
}
