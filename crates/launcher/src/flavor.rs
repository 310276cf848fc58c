//! Shell flavor detection and path translation for POSIX emulation layers
//!
//! The POSIX stub may run under a genuine Unix shell or under an emulation layer on
//! Windows (Cygwin, MSYS2/Git Bash, WSL). Each layer spells paths differently, so each
//! gets a [`PathTranslator`] that turns the shim path into something the launcher can
//! open and the entry path into something the runtime can open. Unknown hosts get the
//! no-op translator.

use cmdshim_common::LaunchEnv;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::runtime::RuntimeSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    Native,
    Cygwin,
    Msys,
    Wsl,
}

impl ShellFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Cygwin => "cygwin",
            Self::Msys => "msys",
            Self::Wsl => "wsl",
        }
    }
}

impl fmt::Display for ShellFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the host used to pick a flavor.
#[derive(Debug, Clone, Copy)]
pub struct HostMarkers<'a> {
    /// `uname -s` as captured by the POSIX stub
    pub uname: Option<&'a str>,
    /// Contents of `/proc/version`, when readable
    pub proc_version: Option<&'a str>,
    pub env: &'a LaunchEnv,
}

struct Detector {
    flavor: ShellFlavor,
    matches: fn(&HostMarkers<'_>) -> bool,
}

// Checked in order; the first match wins.
const DETECTORS: &[Detector] = &[
    Detector {
        flavor: ShellFlavor::Cygwin,
        matches: is_cygwin,
    },
    Detector {
        flavor: ShellFlavor::Msys,
        matches: is_msys,
    },
    Detector {
        flavor: ShellFlavor::Wsl,
        matches: is_wsl,
    },
];

fn uname_contains(markers: &HostMarkers<'_>, needle: &str) -> bool {
    markers
        .uname
        .map(|u| u.to_ascii_uppercase().contains(needle))
        .unwrap_or(false)
}

fn is_cygwin(markers: &HostMarkers<'_>) -> bool {
    uname_contains(markers, "CYGWIN")
}

fn is_msys(markers: &HostMarkers<'_>) -> bool {
    uname_contains(markers, "MINGW")
        || uname_contains(markers, "MSYS")
        || markers.env.get_non_empty("MSYSTEM").is_some()
}

fn is_wsl(markers: &HostMarkers<'_>) -> bool {
    if markers.env.get_non_empty("WSL_DISTRO_NAME").is_some() {
        return true;
    }
    let linux = markers
        .uname
        .map(|u| u.trim().eq_ignore_ascii_case("linux"))
        .unwrap_or(cfg!(target_os = "linux"));
    linux
        && markers
            .proc_version
            .map(|v| v.to_ascii_lowercase().contains("microsoft"))
            .unwrap_or(false)
}

/// Pick the flavor for these markers, defaulting to [`ShellFlavor::Native`].
pub fn detect(markers: &HostMarkers<'_>) -> ShellFlavor {
    DETECTORS
        .iter()
        .find(|d| (d.matches)(markers))
        .map(|d| d.flavor)
        .unwrap_or(ShellFlavor::Native)
}

/// Path handling strategy for one flavor.
pub trait PathTranslator {
    fn flavor(&self) -> ShellFlavor;

    /// Path the launcher uses for its own filesystem access.
    fn host_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Path placed in the runtime's argument vector.
    fn runtime_arg(&self, path: &Path, _runtime: &RuntimeSelection) -> OsString {
        path.as_os_str().to_owned()
    }
}

/// Build the translator for `flavor`.
pub fn translator(flavor: ShellFlavor, env: &LaunchEnv) -> Box<dyn PathTranslator> {
    match flavor {
        ShellFlavor::Native => Box::new(NativeTranslator),
        ShellFlavor::Cygwin => Box::new(DriveMountTranslator {
            flavor,
            mount_prefix: "/cygdrive/",
        }),
        ShellFlavor::Msys => Box::new(DriveMountTranslator {
            flavor,
            mount_prefix: "/",
        }),
        ShellFlavor::Wsl => Box::new(WslTranslator::new(
            env.get_str("WSL_DISTRO_NAME").map(str::to_string),
        )),
    }
}

pub struct NativeTranslator;

impl PathTranslator for NativeTranslator {
    fn flavor(&self) -> ShellFlavor {
        ShellFlavor::Native
    }
}

/// Cygwin and MSYS: the launcher and runtime are Windows programs, but the stub hands
/// over `$0` in the layer's own syntax. Translate before touching the filesystem; the
/// entry path derived from it is then already native.
pub struct DriveMountTranslator {
    flavor: ShellFlavor,
    mount_prefix: &'static str,
}

impl PathTranslator for DriveMountTranslator {
    fn flavor(&self) -> ShellFlavor {
        self.flavor
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        let Some(raw) = path.to_str() else {
            return path.to_path_buf();
        };
        if let Some(native) = drive_mount_to_windows(raw, self.mount_prefix) {
            return PathBuf::from(native);
        }
        if raw.starts_with('/') {
            if let Some(native) = path_tool_windows(Path::new("cygpath"), raw) {
                return PathBuf::from(native);
            }
        }
        path.to_path_buf()
    }
}

/// WSL: the launcher is a Linux program and opens Linux paths directly. A Windows
/// runtime (`node.exe`) needs the entry path in Windows syntax.
///
/// `wslpath -w` is asked first since it knows the distro and any custom automount root.
/// Without it, `/mnt/<drive>` and the `\\wsl$` share are assumed.
pub struct WslTranslator {
    distro: Option<String>,
    wslpath: PathBuf,
}

impl WslTranslator {
    pub fn new(distro: Option<String>) -> Self {
        Self::with_wslpath(distro, "wslpath")
    }

    pub fn with_wslpath(distro: Option<String>, wslpath: impl Into<PathBuf>) -> Self {
        Self {
            distro,
            wslpath: wslpath.into(),
        }
    }
}

impl PathTranslator for WslTranslator {
    fn flavor(&self) -> ShellFlavor {
        ShellFlavor::Wsl
    }

    fn runtime_arg(&self, path: &Path, runtime: &RuntimeSelection) -> OsString {
        if !runtime.is_windows_executable() {
            return path.as_os_str().to_owned();
        }
        path.to_str()
            .and_then(|raw| {
                path_tool_windows(&self.wslpath, raw)
                    .or_else(|| wsl_to_windows(raw, self.distro.as_deref()))
            })
            .map(OsString::from)
            .unwrap_or_else(|| path.as_os_str().to_owned())
    }
}

/// `<mount_prefix><drive>/rest` to `DRIVE:\rest`.
///
/// Returns `None` when the first component after the prefix is not a single drive letter.
pub fn drive_mount_to_windows(path: &str, mount_prefix: &str) -> Option<String> {
    let stripped = path.strip_prefix(mount_prefix)?;
    let (drive, rest) = match stripped.split_once('/') {
        Some((drive, rest)) => (drive, rest),
        None => (stripped, ""),
    };

    let mut chars = drive.chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }

    let converted = rest.trim_end_matches('/').replace('/', "\\");
    Some(format!("{}:\\{converted}", letter.to_ascii_uppercase()))
}

/// A WSL path as Windows sees it: `/mnt/c/x` is `C:\x`, anything else lives under the
/// distro's `\\wsl$` share.
pub fn wsl_to_windows(path: &str, distro: Option<&str>) -> Option<String> {
    if let Some(native) = drive_mount_to_windows(path, "/mnt/") {
        return Some(native);
    }
    if !path.starts_with('/') {
        return None;
    }
    let distro = distro.filter(|d| !d.is_empty())?;
    Some(format!(r"\\wsl$\{distro}{}", path.replace('/', "\\")))
}

/// Ask `cygpath -w` or `wslpath -w` for the Windows spelling of `path`.
fn path_tool_windows(tool: &Path, path: &str) -> Option<String> {
    let output = Command::new(tool)
        .arg("-w")
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let converted = String::from_utf8(output.stdout).ok()?;
    let converted = converted.trim_end_matches(['\r', '\n']);
    (!converted.is_empty()).then(|| converted.to_string())
}
