use crate::{fix_path, utils::FixPath};

use anyhow::{Context, Result};
use ron::{extensions::Extensions, Options};
use serde::Deserialize;
use std::{fmt, fs, path::Path};

/// One side of a link. An absent or empty host means the local machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncEndpoint {
    pub host: Option<String>,
    pub path: String,
}

impl SyncEndpoint {
    pub fn new(host: Option<&str>, path: &str) -> Self {
        Self {
            host: host.filter(|h| !h.is_empty()).map(String::from),
            path: path.to_string(),
        }
    }

    pub fn local(path: &str) -> Self {
        Self::new(None, path)
    }

    pub fn remote(host: &str, path: &str) -> Self {
        Self::new(Some(host), path)
    }
}

/// Renders the endpoint the way rsync expects it: `host:path` or `path`.
///
/// # Example
///
/// ```rust
/// use rsync_mapper::mapping::SyncEndpoint;
///
/// assert_eq!(SyncEndpoint::remote("nas", "/tank/music").to_string(), "nas:/tank/music");
/// assert_eq!(SyncEndpoint::local("~/music").to_string(), "~/music");
/// ```
impl fmt::Display for SyncEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{host}:{}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// A directional pairing of a source and a destination to keep in sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncLink {
    pub source: SyncEndpoint,
    pub destination: SyncEndpoint,
}

impl SyncLink {
    pub fn new(source: SyncEndpoint, destination: SyncEndpoint) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// The same pair with source and destination swapped.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
        }
    }
}

impl fmt::Display for SyncLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Links sharing one destination host, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostGroup {
    pub host: Option<String>,
    pub links: Vec<SyncLink>,
}

impl HostGroup {
    pub fn label(&self) -> &str {
        self.host.as_deref().unwrap_or("local")
    }
}

/// The configured sync topology, grouped by destination host.
///
/// Groups appear in the order their destination host was first seen, and
/// each link sits in exactly one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingModel {
    groups: Vec<HostGroup>,
}

impl MappingModel {
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = SyncLink>,
    {
        let mut groups: Vec<HostGroup> = Vec::new();

        for link in links {
            match groups
                .iter_mut()
                .find(|g| g.host == link.destination.host)
            {
                Some(group) => group.links.push(link),
                None => groups.push(HostGroup {
                    host: link.destination.host.clone(),
                    links: vec![link],
                }),
            }
        }

        Self { groups }
    }

    /// Reads the file map at `path`. `.ron` files are parsed as RON, anything
    /// else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to open file map {}", path.display()))?;

        let hosts: Vec<HostEntry> = if path.extension().is_some_and(|ext| ext == "ron") {
            Options::default()
                .with_default_extension(Extensions::IMPLICIT_SOME)
                .from_str(&contents)
                .with_context(|| format!("Failed to parse file map {}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse file map {}", path.display()))?
        };

        Ok(Self::from_document(&hosts))
    }

    /// Resolves the user supplied map path (`~` and `./` prefixes) and loads it.
    pub fn load_user_path(path: &str) -> Result<Self> {
        Self::load(fix_path!(path))
    }

    /// Flattens the document host -> dir -> dest, which is the canonical link
    /// order.
    pub fn from_document(hosts: &[HostEntry]) -> Self {
        Self::from_links(hosts.iter().flat_map(|host| {
            host.dirs.iter().flat_map(move |dir| {
                dir.dests.iter().map(move |dest| {
                    SyncLink::new(
                        SyncEndpoint::new(host.host.as_deref(), &dir.src),
                        SyncEndpoint::new(dest.host.as_deref(), &dest.dest),
                    )
                })
            })
        }))
    }

    pub fn groups(&self) -> &[HostGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&HostGroup> {
        self.groups.get(index)
    }

    pub fn link(&self, group: usize, index: usize) -> Option<&SyncLink> {
        self.group(group).and_then(|g| g.links.get(index))
    }

    /// Every link, group by group.
    pub fn links(&self) -> impl Iterator<Item = &SyncLink> {
        self.groups.iter().flat_map(|g| g.links.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.links.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Lines listing the grouped mapping, with `group-link` ids when
    /// `show_ids` is set.
    pub fn render(&self, show_ids: bool) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.len() + self.groups.len());

        for (i, group) in self.groups.iter().enumerate() {
            if show_ids {
                lines.push(format!("{i} {} paths:", group.label()));
            } else {
                lines.push(format!("{} paths:", group.label()));
            }
            for (j, link) in group.links.iter().enumerate() {
                if show_ids {
                    lines.push(format!("\t{i}-{j} {} {}", link.source, link.destination));
                } else {
                    lines.push(format!("\t{} {}", link.source, link.destination));
                }
            }
        }

        lines
    }
}

/// Top level entry of the file map: a source host and its directories.
#[derive(Deserialize, Debug, Clone)]
pub struct HostEntry {
    #[serde(default)]
    pub host: Option<String>,
    pub dirs: Vec<DirEntry>,
}

/// A source directory and everywhere it should be copied to.
#[derive(Deserialize, Debug, Clone)]
pub struct DirEntry {
    pub src: String,
    pub dests: Vec<DestEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DestEntry {
    #[serde(default)]
    pub host: Option<String>,
    pub dest: String,
}
