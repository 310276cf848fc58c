//! Shared types for the cmdshim launcher and its operator CLI

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;

pub mod commands;
pub mod env;

pub use commands::{
    CommandSpec, GLOBAL_CONFIG_VAR, GLOBAL_PREFIX_VAR, PACKAGE_NAME, RUNTIME_NAME, USER_CONFIG_VAR,
};
pub use env::LaunchEnv;

/// Split a PATH-like value into search directories, preserving order.
///
/// Empty and relative entries are dropped, as are repeats (trailing separators are
/// ignored when comparing).
pub fn search_dirs(path: &OsStr) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    std::env::split_paths(path)
        .filter(|dir| !dir.as_os_str().is_empty() && dir.is_absolute())
        .filter(|dir| {
            let canonical = dir
                .to_string_lossy()
                .trim_end_matches(['/', '\\'])
                .to_string();
            seen.insert(canonical)
        })
        .collect()
}

/// Standard trace record field names
pub mod log_schema {
    pub const TIMESTAMP: &str = "ts";
    pub const INVOCATION_ID: &str = "invocation_id";
    pub const COMMAND: &str = "command";
    pub const COMPONENT: &str = "component";
    pub const EXIT_CODE: &str = "exit_code";
    pub const TERM_SIGNAL: &str = "term_signal";
    pub const DURATION_MS: &str = "duration_ms";
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[cfg(unix)]
    #[test]
    fn test_search_dirs_dedupes_and_skips_relative() {
        let dirs = search_dirs(OsStr::new("/usr/bin:/bin:/usr/bin/::relative/bin:/usr/local/bin:/bin"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/usr/local/bin"),
            ]
        );
    }

    #[test]
    fn test_search_dirs_empty() {
        assert!(search_dirs(OsStr::new("")).is_empty());
    }

    #[cfg(unix)]
    proptest! {
        #[test]
        fn search_dirs_never_repeats(parts in proptest::collection::vec("/[a-z]{1,4}(/[a-z]{1,4})?", 0..12)) {
            let joined = parts.join(":");
            let dirs = search_dirs(OsStr::new(&joined));
            let unique: HashSet<_> = dirs.iter().collect();
            prop_assert_eq!(unique.len(), dirs.len());
            prop_assert!(dirs.iter().all(|d| d.is_absolute()));
        }
    }
}
