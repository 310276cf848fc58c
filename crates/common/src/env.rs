//! Explicit environment snapshot threaded through runtime selection, resolution and delegation

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Immutable view of the environment a launch runs under.
///
/// Components read variables from here instead of the process environment, so tests can
/// describe any environment without touching global state. The same snapshot becomes the
/// child's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl LaunchEnv {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars_os())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(name, _)| key_matches(name, key))
            .map(|(_, value)| value.as_os_str())
    }

    /// Like [`LaunchEnv::get`], but any ASCII spelling of `key` matches. An exact match
    /// wins over a differently cased one.
    ///
    /// npm reads its `npm_config_*` variables this way on every platform.
    pub fn get_ignore_case(&self, key: &str) -> Option<&OsStr> {
        self.get(key).or_else(|| {
            self.vars
                .iter()
                .find(|(name, _)| name.to_str().is_some_and(|n| n.eq_ignore_ascii_case(key)))
                .map(|(_, value)| value.as_os_str())
        })
    }

    /// Value of `key` when it is set to something other than the empty string.
    pub fn get_non_empty(&self, key: &str) -> Option<&OsStr> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OsStr::to_str)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Copy of this environment with `key` removed.
    pub fn without(&self, key: &str) -> Self {
        Self {
            vars: self
                .vars
                .iter()
                .filter(|(name, _)| !key_matches(name, key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Directories of `PATH`, deduplicated, absolute entries only.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.get("PATH").map(crate::search_dirs).unwrap_or_default()
    }
}

// Variable names are case-insensitive on Windows.
fn key_matches(name: &OsStr, key: &str) -> bool {
    if cfg!(windows) {
        name.to_str()
            .map(|n| n.eq_ignore_ascii_case(key))
            .unwrap_or(false)
    } else {
        name == OsStr::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_non_empty_ignores_blank_values() {
        let env = LaunchEnv::from_pairs([("NPM_SHIM_NODE", ""), ("NPX_SHIM_NODE", "/opt/node")]);
        assert!(env.is_set("NPM_SHIM_NODE"));
        assert_eq!(env.get_non_empty("NPM_SHIM_NODE"), None);
        assert_eq!(
            env.get_non_empty("NPX_SHIM_NODE"),
            Some(OsStr::new("/opt/node"))
        );
    }

    #[test]
    fn test_without_leaves_original_untouched() {
        let env = LaunchEnv::from_pairs([("A", "1"), ("B", "2")]);
        let trimmed = env.without("A");
        assert_eq!(trimmed.get_str("A"), None);
        assert_eq!(trimmed.get_str("B"), Some("2"));
        assert_eq!(trimmed.len(), 1);
        assert_eq!(env.get_str("A"), Some("1"));
    }

    #[test]
    fn test_get_ignore_case_matches_any_spelling() {
        let env = LaunchEnv::from_pairs([("NPM_CONFIG_PREFIX", "/home/node/.npm-global")]);
        assert_eq!(
            env.get_ignore_case("npm_config_prefix"),
            Some(OsStr::new("/home/node/.npm-global"))
        );
        assert_eq!(env.get_ignore_case("npm_config_userconfig"), None);

        let both = LaunchEnv::from_pairs([("NPM_CONFIG_PREFIX", "/upper"), ("npm_config_prefix", "/exact")]);
        assert_eq!(both.get_ignore_case("npm_config_prefix"), Some(OsStr::new("/exact")));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_path_uses_path_var() {
        let env = LaunchEnv::from_pairs([("PATH", "/a:/b:/a")]);
        assert_eq!(
            env.search_path(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert!(LaunchEnv::default().search_path().is_empty());
    }
}
