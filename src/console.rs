use anyhow::{anyhow, bail, Context, Result};
use std::{
    io::{self, BufRead, Write},
    sync::{Arc, Mutex},
};
use tracing::warn;

/// Line oriented user interaction.
///
/// All prompts and reports go through this seam so the interactive parts can
/// be driven from a script.
pub trait Console {
    /// Prints `prompt` without a newline and reads one line. `None` means the
    /// input stream is closed.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Prints one line of output.
    fn say(&mut self, line: &str);
}

/// A console over any line reader and writer.
///
/// The writer is shared behind a mutex and only held while writing, so other
/// threads (the Ctrl-C handler) can print while a read is pending.
pub struct StreamConsole<R, W> {
    input: R,
    output: Arc<Mutex<W>>,
}

/// The process' standard streams.
pub type StdConsole = StreamConsole<io::StdinLock<'static>, io::Stdout>;

impl<R: BufRead, W: Write> StreamConsole<R, W> {
    pub fn new(input: R, output: Arc<Mutex<W>>) -> Self {
        Self { input, output }
    }

    fn write_out(&self, text: &str, newline: bool) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| anyhow!("console output lock poisoned"))?;
        out.write_all(text.as_bytes())
            .context("Failed to write to console")?;
        if newline {
            out.write_all(b"\n").context("Failed to write to console")?;
        }
        out.flush().context("Failed to flush console")
    }
}

impl StdConsole {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), Arc::new(Mutex::new(io::stdout())))
    }
}

impl<R: BufRead, W: Write> Console for StreamConsole<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        // The output lock is released before blocking on input.
        self.write_out(prompt, false)?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&mut self, line: &str) {
        if let Err(e) = self.write_out(line, true) {
            warn!("{e:#}");
        }
    }
}

/// Reads a line, treating a closed input stream as fatal.
fn require_line(console: &mut dyn Console, prompt: &str) -> Result<String> {
    match console.read_line(prompt)? {
        Some(line) => Ok(line),
        None => bail!("standard input closed"),
    }
}

/// Asks a yes/no question until the answer is exactly `y` or `n`.
///
/// `no_msg` is printed on `n`, `yes_msg` on `y`, each only when non-empty.
/// Returns `true` for `y`.
pub fn get_confirmation(
    console: &mut dyn Console,
    prompt: &str,
    no_msg: &str,
    yes_msg: &str,
) -> Result<bool> {
    loop {
        match require_line(console, prompt)?.as_str() {
            "y" => {
                if !yes_msg.is_empty() {
                    console.say(yes_msg);
                }
                return Ok(true);
            }
            "n" => {
                if !no_msg.is_empty() {
                    console.say(no_msg);
                }
                return Ok(false);
            }
            _ => console.say("Invalid response. Try again."),
        }
    }
}

/// Asks until the answer is one of `options`, and returns it.
pub fn ask_user(console: &mut dyn Console, prompt: &str, options: &[&str]) -> Result<String> {
    loop {
        let ans = require_line(console, prompt)?;
        if options.contains(&ans.as_str()) {
            return Ok(ans);
        }
        console.say("Invalid response. Try again.");
    }
}
