use std::{env, path::PathBuf};

/// A macro that expands a user supplied path, falling back to the path as
/// given when there is nothing to expand.
///
/// # Examples
///
/// ```rust
/// use rsync_mapper::fix_path;
/// use rsync_mapper::utils::FixPath;
/// use std::path::PathBuf;
///
/// let plain = fix_path!("/etc/filesMap.json");
/// assert_eq!(plain, PathBuf::from("/etc/filesMap.json"));
///
/// let home = fix_path!("~/filesMap.json");
/// assert_eq!(home, home::home_dir().unwrap().join("filesMap.json"));
/// ```
#[macro_export]
macro_rules! fix_path {
    ($path:expr) => {
        $path.fix_path().unwrap_or($path.into())
    };
}

/// A trait for expanding paths typed on the command line.
/// For example, ~/filesMap.json will be converted to /home/username/filesMap.json
pub trait FixPath<T> {
    /// Returns the expanded path, or `None` when it is already usable as is.
    fn fix_path(&self) -> Option<PathBuf>;
}

/// Expand `~` and `./` prefixes for type `&str`
///
/// # Examples
///
/// ```rust
/// use rsync_mapper::utils::FixPath;
///
/// assert!("/srv/map.json".fix_path().is_none());
/// assert!("~/map.json".fix_path().is_some());
/// assert!("./map.json".fix_path().is_some());
/// ```
impl FixPath<&str> for &str {
    fn fix_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.strip_prefix("./") {
            return env::current_dir().ok().map(|cwd| cwd.join(rest));
        }

        if *self == "~" {
            return home::home_dir();
        }

        // Only the current user's home, ~otheruser is left to the shell
        self.strip_prefix("~/")
            .and_then(|rest| home::home_dir().map(|home| home.join(rest)))
    }
}

impl FixPath<String> for String {
    fn fix_path(&self) -> Option<PathBuf> {
        self.as_str().fix_path()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fix_path_variants() {
        let home = home::home_dir().unwrap();

        assert_eq!("~".fix_path(), Some(home.clone()));
        assert_eq!("~/a/b".fix_path(), Some(home.join("a/b")));
        assert_eq!(String::from("~/x").fix_path(), Some(home.join("x")));
        assert_eq!("~other/x".fix_path(), None);
        assert_eq!("relative/map.json".fix_path(), None);
        assert_eq!(
            "./map.json".fix_path(),
            Some(env::current_dir().unwrap().join("map.json"))
        );
    }
}
