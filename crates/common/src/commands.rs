//! Command specs: which entry script a command runs and which variable selects its runtime

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Package whose commands the shims launch
pub const PACKAGE_NAME: &str = "npm";
/// Default runtime executable name
pub const RUNTIME_NAME: &str = "node";
/// Global install prefix honored before any layout relative to the shim
pub const GLOBAL_PREFIX_VAR: &str = "npm_config_prefix";
/// Location of the user npmrc, `~/.npmrc` when unset
pub const USER_CONFIG_VAR: &str = "npm_config_userconfig";
/// Location of the global npmrc, `<prefix>/etc/npmrc` when unset
pub const GLOBAL_CONFIG_VAR: &str = "npm_config_globalconfig";

/// A launchable command of the package.
///
/// Serializes as its bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommandSpec {
    name: String,
}

impl CommandSpec {
    /// The primary command (`npm`).
    pub fn primary() -> Self {
        Self {
            name: "npm".to_string(),
        }
    }

    /// The secondary command (`npx`).
    pub fn secondary() -> Self {
        Self {
            name: "npx".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &'static str {
        PACKAGE_NAME
    }

    /// File name of the entry script, e.g. `npm-cli.js`.
    pub fn entry_script(&self) -> String {
        format!("{}-cli.js", self.name)
    }

    /// Environment variable naming the runtime for this command, e.g. `NPM_SHIM_NODE`.
    pub fn runtime_override_var(&self) -> String {
        format!(
            "{}_SHIM_{}",
            self.name.to_ascii_uppercase().replace('-', "_"),
            RUNTIME_NAME.to_ascii_uppercase()
        )
    }
}

impl FromStr for CommandSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let valid = !value.is_empty()
            && !value.starts_with('-')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self {
                name: value.to_string(),
            })
        } else {
            Err(format!("invalid command name: {value:?}"))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
