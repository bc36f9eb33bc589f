use crate::{
    console::ask_user,
    mapping::{MappingModel, SyncLink},
    readiness::{preflight, Readiness},
    rsync::Rsync,
};

use anyhow::{bail, Result};
use tracing::debug;

const MENU: &str = "What do you want to do?

's'ync - sync source files to remote
'r'emote sync - sync remote files to source
'c'lean - remove files on remote that no longer exist on source
't'idy - remove files on source that no longer exist on remote
'd'one - Finished with this dir

Choice: ";

const ACTION_LETTERS: [&str; 5] = ["s", "r", "c", "t", "d"];

/// Printed when the user leaves with Ctrl-C or closes the input.
pub const FAREWELL: &str = "Goodbye :(";

/// What the user typed at the id prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Every link of a group.
    Group(usize),
    /// A single `group-link` pair.
    Link(usize, usize),
    Quit,
}

impl Selector {
    /// Parses `input` against `model`. Returns `None` for malformed input and
    /// out of range ids.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rsync_mapper::interactive::Selector;
    /// use rsync_mapper::mapping::{MappingModel, SyncEndpoint, SyncLink};
    ///
    /// let model = MappingModel::from_links(vec![SyncLink::new(
    ///     SyncEndpoint::local("/a"),
    ///     SyncEndpoint::remote("nas", "/b"),
    /// )]);
    ///
    /// assert_eq!(Selector::parse("0", &model), Some(Selector::Group(0)));
    /// assert_eq!(Selector::parse("0-0", &model), Some(Selector::Link(0, 0)));
    /// assert_eq!(Selector::parse("0-1", &model), None);
    /// ```
    pub fn parse(input: &str, model: &MappingModel) -> Option<Self> {
        let input = input.trim();
        if input == "q" {
            return Some(Selector::Quit);
        }

        match input.split_once('-') {
            None => {
                let group = input.parse::<usize>().ok()?;
                model.group(group)?;
                Some(Selector::Group(group))
            }
            Some((group, link)) => {
                let group = group.trim().parse::<usize>().ok()?;
                let link = link.trim().parse::<usize>().ok()?;
                model.link(group, link)?;
                Some(Selector::Link(group, link))
            }
        }
    }
}

/// One entry of the action menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Source to destination.
    Sync,
    /// Destination back to source.
    RemoteSync,
    /// Delete on the destination what the source no longer has.
    Clean,
    /// Delete on the source what the destination no longer has.
    Tidy,
    Done,
}

impl Action {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "s" => Some(Action::Sync),
            "r" => Some(Action::RemoteSync),
            "c" => Some(Action::Clean),
            "t" => Some(Action::Tidy),
            "d" => Some(Action::Done),
            _ => None,
        }
    }

    fn apply(self, rsync: &mut Rsync, link: &SyncLink) -> Result<bool> {
        match self {
            Action::Sync => rsync.safe_sync(link),
            Action::RemoteSync => rsync.safe_sync(&link.reversed()),
            Action::Clean => rsync.safe_remove(link),
            Action::Tidy => rsync.safe_remove(&link.reversed()),
            Action::Done => Ok(true),
        }
    }
}

/// Lets the user pick a group or a single path and act on it until they
/// quit.
pub fn run(
    rsync: &mut Rsync,
    model: &MappingModel,
    hook: Option<&mut dyn Readiness>,
) -> Result<()> {
    preflight(hook)?;

    loop {
        rsync.console().say("File map to choose from:");
        for line in model.render(true) {
            rsync.console().say(&line);
        }

        let (links, select_all): (Vec<&SyncLink>, bool) = match read_selector(rsync, model)? {
            Selector::Quit => return Ok(()),
            Selector::Group(group) => (model.groups()[group].links.iter().collect(), true),
            Selector::Link(group, link) => (vec![&model.groups()[group].links[link]], false),
        };

        act_on(rsync, &links, select_all)?;
    }
}

fn read_selector(rsync: &mut Rsync, model: &MappingModel) -> Result<Selector> {
    loop {
        let Some(input) = rsync.console().read_line("Input id (or 'q' to quit): ")? else {
            rsync.console().say(FAREWELL);
            return Ok(Selector::Quit);
        };

        match Selector::parse(&input, model) {
            Some(selector) => {
                debug!(?selector, "selected");
                return Ok(selector);
            }
            None => rsync.console().say("Invalid id. Try again."),
        }
    }
}

fn act_on(rsync: &mut Rsync, links: &[&SyncLink], select_all: bool) -> Result<()> {
    loop {
        rsync.console().say(if select_all {
            "Paths selected:"
        } else {
            "Path selected:"
        });
        for link in links {
            rsync
                .console()
                .say(&format!("{} {}", link.source, link.destination));
        }

        let ans = ask_user(rsync.console(), MENU, &ACTION_LETTERS)?;
        let Some(action) = Action::from_letter(&ans) else {
            bail!("Invalid response from user: {ans:?}");
        };

        if action == Action::Done {
            return Ok(());
        }

        for link in links {
            action.apply(rsync, link)?;
        }
    }
}
