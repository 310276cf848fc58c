//! Installation resolution: from the shim's own location to the entry script it must run
//!
//! The shim path is fully dereferenced first, so a shim reached through a global-install
//! symlink is resolved against the tree the symlink points into. Candidates are then
//! tried in a fixed order and the first one that exists wins, starting under the global
//! prefix npm is configured with (environment or npmrc). Nothing is cached.

use cmdshim_common::{
    CommandSpec, LaunchEnv, GLOBAL_CONFIG_VAR, GLOBAL_PREFIX_VAR, USER_CONFIG_VAR,
};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// Candidate layouts, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<prefix>/[lib/]node_modules/<pkg>/bin/<entry>` under an explicitly configured global prefix
    GlobalPrefix,
    /// `<dir>/<entry>`: the shim sits in the package's own bin directory
    PackageBin,
    /// `<dir>/node_modules/<pkg>/bin/<entry>`: the shim sits in a runtime install root
    RuntimeBundled,
    /// `<dir>/../lib/node_modules/<pkg>/bin/<entry>`: the shim sits in `<prefix>/bin`
    PrefixLib,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalPrefix => "global-prefix",
            Self::PackageBin => "package-bin",
            Self::RuntimeBundled => "runtime-bundled",
            Self::PrefixLib => "prefix-lib",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub layout: Layout,
    pub path: PathBuf,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The shim after every symlink was followed
    pub resolved_shim: PathBuf,
    pub entry: PathBuf,
    pub layout: Layout,
    /// Global prefix that was tried first, if one is configured
    pub prefix: Option<ConfiguredPrefix>,
    /// Candidates checked, in order, including the winner
    pub tried: Vec<Candidate>,
}

/// Follow every symlink in `shim` and return the real file.
pub fn dereference(shim: &Path) -> Result<PathBuf, LaunchError> {
    fs::canonicalize(shim)
        .map(strip_verbatim)
        .map_err(|source| LaunchError::ShimPath {
            path: shim.to_path_buf(),
            source,
        })
}

/// Where the configured global prefix was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixOrigin {
    /// `npm_config_prefix`, in any letter case
    Environment,
    /// A `prefix=` line in this npmrc
    Npmrc(PathBuf),
}

impl fmt::Display for PrefixOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str(GLOBAL_PREFIX_VAR),
            Self::Npmrc(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A global prefix npm itself would install into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredPrefix {
    pub path: PathBuf,
    pub origin: PrefixOrigin,
}

/// The global prefix configured for a shim in `shim_dir`, in npm's precedence order:
/// environment, user npmrc, global npmrc, then the npmrc bundled with the package.
///
/// Only plain file reads; the runtime is never asked.
pub fn configured_prefix(
    spec: &CommandSpec,
    shim_dir: &Path,
    env: &LaunchEnv,
) -> Option<ConfiguredPrefix> {
    if let Some(prefix) = env.get_ignore_case(GLOBAL_PREFIX_VAR).filter(|v| !v.is_empty()) {
        return Some(ConfiguredPrefix {
            path: PathBuf::from(prefix),
            origin: PrefixOrigin::Environment,
        });
    }

    npmrc_locations(spec, shim_dir, env)
        .into_iter()
        .find_map(|rc| {
            let contents = fs::read_to_string(&rc).ok()?;
            let prefix = npmrc_prefix(&contents, env)?;
            log::debug!("global prefix {prefix} from {}", rc.display());
            Some(ConfiguredPrefix {
                path: PathBuf::from(prefix),
                origin: PrefixOrigin::Npmrc(rc),
            })
        })
}

// Highest precedence first.
fn npmrc_locations(spec: &CommandSpec, shim_dir: &Path, env: &LaunchEnv) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(4);

    match env.get_ignore_case(USER_CONFIG_VAR).filter(|v| !v.is_empty()) {
        Some(userconfig) => out.push(expand_home(&userconfig.to_string_lossy(), env).into()),
        None => out.extend(home_dir(env).map(|home| home.join(".npmrc"))),
    }

    match env.get_ignore_case(GLOBAL_CONFIG_VAR).filter(|v| !v.is_empty()) {
        Some(globalconfig) => out.push(PathBuf::from(globalconfig)),
        None => {
            // Runtime root (Windows layout), then `<prefix>/bin`
            out.push(shim_dir.join("etc").join("npmrc"));
            if let Some(prefix) = shim_dir.parent() {
                out.push(prefix.join("etc").join("npmrc"));
            }
        }
    }

    out.push(
        shim_dir
            .join("node_modules")
            .join(spec.package())
            .join("npmrc"),
    );
    out
}

fn home_dir(env: &LaunchEnv) -> Option<PathBuf> {
    let key = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env.get_non_empty(key).map(PathBuf::from)
}

fn expand_home(value: &str, env: &LaunchEnv) -> String {
    let rest = match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return value.to_string(),
    };
    match home_dir(env) {
        Some(home) => format!("{}{rest}", home.display()),
        None => value.to_string(),
    }
}

/// Top-level `prefix` from npmrc `contents`, with `${VAR}` references and a leading `~`
/// expanded. The last assignment wins; keys inside `[section]` blocks are ignored.
fn npmrc_prefix(contents: &str, env: &LaunchEnv) -> Option<String> {
    let mut prefix = None;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with([';', '#']) {
            continue;
        }
        if line.starts_with('[') {
            break;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("prefix") {
            continue;
        }
        let value = unquote(value.trim());
        if !value.is_empty() {
            prefix = Some(expand_home(&expand_env(value, env), env));
        }
    }
    prefix
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

// `${NAME}` is replaced when NAME is set, `${NAME?}` always (empty when unset).
fn expand_env(value: &str, env: &LaunchEnv) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        let (name, optional) = match name.strip_suffix('?') {
            Some(name) => (name, true),
            None => (name, false),
        };
        out.push_str(&rest[..start]);
        match env.get(name) {
            Some(found) => out.push_str(&found.to_string_lossy()),
            None if optional => {}
            None => out.push_str(&rest[start..start + 3 + len]),
        }
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}

/// Every place the entry script may live for a shim whose real directory is `shim_dir`.
pub fn candidates(spec: &CommandSpec, shim_dir: &Path, prefix: Option<&Path>) -> Vec<Candidate> {
    let entry = spec.entry_script();
    let package_bin = |root: &Path| {
        root.join("node_modules")
            .join(spec.package())
            .join("bin")
            .join(&entry)
    };

    let mut out = Vec::with_capacity(5);

    if let Some(prefix) = prefix {
        out.push(Candidate {
            layout: Layout::GlobalPrefix,
            path: package_bin(prefix),
        });
        out.push(Candidate {
            layout: Layout::GlobalPrefix,
            path: package_bin(&prefix.join("lib")),
        });
    }

    out.push(Candidate {
        layout: Layout::PackageBin,
        path: shim_dir.join(&entry),
    });
    out.push(Candidate {
        layout: Layout::RuntimeBundled,
        path: package_bin(shim_dir),
    });
    if let Some(prefix) = shim_dir.parent() {
        out.push(Candidate {
            layout: Layout::PrefixLib,
            path: package_bin(&prefix.join("lib")),
        });
    }

    out
}

/// Resolve the entry script `spec` should run for the shim at `shim`.
pub fn resolve_entry(
    spec: &CommandSpec,
    shim: &Path,
    env: &LaunchEnv,
) -> Result<Resolution, LaunchError> {
    let resolved_shim = dereference(shim)?;
    let shim_dir = resolved_shim
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    if resolved_shim.as_path() != shim {
        log::debug!(
            "shim {} resolves to {}",
            shim.display(),
            resolved_shim.display()
        );
    }

    let prefix = configured_prefix(spec, &shim_dir, env);
    let mut tried = Vec::new();
    for candidate in candidates(spec, &shim_dir, prefix.as_ref().map(|p| p.path.as_path())) {
        let found = candidate.path.is_file();
        log::trace!(
            "candidate {} ({}): {}",
            candidate.path.display(),
            candidate.layout,
            if found { "present" } else { "absent" }
        );
        tried.push(candidate.clone());
        if found {
            return Ok(Resolution {
                resolved_shim,
                entry: candidate.path,
                layout: candidate.layout,
                prefix,
                tried,
            });
        }
    }

    Err(LaunchError::Resolution {
        shim: resolved_shim,
        entry: spec.entry_script(),
        tried,
    })
}

// canonicalize() yields `\\?\C:\...` on Windows, which some runtimes reject as a
// script path. Plain drive paths are returned without the prefix.
#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path;
    };
    if let Some(rest) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{rest}"));
    }
    match raw.strip_prefix(r"\\?\") {
        Some(rest) if rest.as_bytes().get(1) == Some(&b':') => PathBuf::from(rest),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}
