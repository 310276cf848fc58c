//! Runtime selection: override variable, sibling runtime, PATH search, bare fallback
//!
//! Nothing here fails. A selection that could not be located is reported as
//! [`RuntimeSource::Fallback`] and the launcher decides what to do with it.

use cmdshim_common::{CommandSpec, LaunchEnv, RUNTIME_NAME};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a runtime selection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSource {
    /// Taken verbatim from the command's override variable
    Override,
    /// Found next to the invoked shim
    Sibling,
    /// Found by searching PATH
    SearchPath,
    /// Nothing found; bare default name
    Fallback,
}

impl RuntimeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Sibling => "sibling",
            Self::SearchPath => "search-path",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for RuntimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSelection {
    pub program: PathBuf,
    pub source: RuntimeSource,
}

impl RuntimeSelection {
    /// False when the selection is only the bare fallback name.
    pub fn is_located(&self) -> bool {
        self.source != RuntimeSource::Fallback
    }

    pub fn consumed_override(&self) -> bool {
        self.source == RuntimeSource::Override
    }

    /// Whether the runtime is a Windows program (relevant under WSL, where
    /// it cannot open Linux-style paths).
    pub fn is_windows_executable(&self) -> bool {
        self.program
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("exe"))
            .unwrap_or(false)
    }
}

/// Select the runtime for `spec`.
///
/// `invoked_dir` is the directory the shim was invoked from, before any symlink is
/// followed: a runtime install that bundles the package keeps its runtime there.
pub fn locate_runtime(
    spec: &CommandSpec,
    env: &LaunchEnv,
    invoked_dir: Option<&Path>,
) -> RuntimeSelection {
    if let Some(value) = env.get_non_empty(&spec.runtime_override_var()) {
        return RuntimeSelection {
            program: PathBuf::from(value),
            source: RuntimeSource::Override,
        };
    }

    if let Some(dir) = invoked_dir {
        for name in sibling_names() {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return RuntimeSelection {
                    program: candidate,
                    source: RuntimeSource::Sibling,
                };
            }
        }
    }

    if let Some(found) = resolve_on_path(RUNTIME_NAME, &env.search_path(), env.get_str("PATHEXT")) {
        return RuntimeSelection {
            program: found,
            source: RuntimeSource::SearchPath,
        };
    }

    log::debug!("no {RUNTIME_NAME} on PATH, falling back to bare name");
    RuntimeSelection {
        program: PathBuf::from(RUNTIME_NAME),
        source: RuntimeSource::Fallback,
    }
}

fn sibling_names() -> [String; 2] {
    [format!("{RUNTIME_NAME}.exe"), RUNTIME_NAME.to_string()]
}

/// Search `search_paths` in order for an executable called `command`.
pub fn resolve_on_path(
    command: &str,
    search_paths: &[PathBuf],
    #[allow(unused_variables)] pathext: Option<&str>,
) -> Option<PathBuf> {
    for dir in search_paths {
        let candidate = dir.join(command);

        // On Windows, try with common executable extensions
        #[cfg(windows)]
        {
            let extensions = pathext.unwrap_or(".COM;.EXE;.BAT;.CMD");

            for ext in extensions.split(';') {
                if ext.len() > 1 {
                    let mut path_with_ext = candidate.clone().into_os_string();
                    path_with_ext.push(ext);
                    let path_with_ext = PathBuf::from(path_with_ext);
                    if is_executable(&path_with_ext) {
                        return Some(path_with_ext);
                    }
                }
            }
        }

        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// Check if a path is executable (cross-platform)
pub(crate) fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            metadata.is_file() && (metadata.permissions().mode() & 0o111 != 0)
        } else {
            false
        }
    }

    #[cfg(windows)]
    {
        if let Ok(meta) = std::fs::metadata(path) {
            meta.is_file()
                && matches!(
                    path.extension()
                        .and_then(|e| e.to_str())
                        .map(|s| s.to_ascii_lowercase()),
                    Some(ref ext) if ["exe", "bat", "cmd", "com"].contains(&ext.as_str())
                )
        } else {
            false
        }
    }
}
