//! Launch context: everything one invocation knows before it starts resolving
//!
//! This module turns the stub's command line and the process environment into an
//! immutable [`LaunchContext`].

use clap::{Parser, ValueEnum};
use cmdshim_common::{CommandSpec, LaunchEnv};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LaunchError;
use crate::flavor::{self, HostMarkers, PathTranslator, ShellFlavor};

/// Environment variable names used by the launcher itself
pub const LAUNCHER_VAR: &str = "CMDSHIM_LAUNCHER"; // Launcher path override, baked into rendered stubs
pub const LOG_FILTER_VAR: &str = "CMDSHIM_LOG"; // env_logger filter, default off
pub const TRACE_LOG_VAR: &str = "CMDSHIM_TRACE_LOG"; // JSONL invocation trace
pub const LOG_OPTS_VAR: &str = "CMDSHIM_LOG_OPTS"; // "raw" disables argv redaction in the trace

/// Host shell grammar the stub was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellKind {
    /// POSIX `sh` stub; may run under an emulation layer
    Posix,
    /// Native `cmd.exe` batch stub
    Cmd,
}

impl ShellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Cmd => "cmd",
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command line the stubs use to hand over to the launcher.
#[derive(Debug, Parser)]
#[command(
    name = "cmdshim-launch",
    version = crate::VERSION,
    about = "Delegates a shim invocation to the linked npm installation"
)]
pub struct LauncherArgs {
    /// Command being launched (npm, npx)
    #[arg(long)]
    pub command: String,

    /// Grammar of the invoking stub
    #[arg(long, value_enum, default_value_t = ShellKind::Posix)]
    pub shell: ShellKind,

    /// Output of `uname -s` on the host running the stub
    #[arg(long)]
    pub uname: Option<String>,

    /// Path of the invoking stub, as the shell saw it
    #[arg(long)]
    pub shim: PathBuf,

    /// Arguments for the delegated command, forwarded verbatim
    #[arg(last = true)]
    pub args: Vec<OsString>,
}

/// Execution context for one launch
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub spec: CommandSpec,
    pub shell: ShellKind,
    /// Shim path as handed over by the stub, before translation or dereferencing
    pub shim_path: PathBuf,
    pub args: Vec<OsString>,
    pub env: LaunchEnv,
    pub uname: Option<String>,
    pub proc_version: Option<String>,
}

impl LaunchContext {
    pub fn new(spec: CommandSpec, shell: ShellKind, shim_path: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            shell,
            shim_path: shim_path.into(),
            args: Vec::new(),
            env: LaunchEnv::default(),
            uname: None,
            proc_version: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, env: LaunchEnv) -> Self {
        self.env = env;
        self
    }

    pub fn with_uname(mut self, uname: Option<String>) -> Self {
        self.uname = uname;
        self
    }

    pub fn with_proc_version(mut self, proc_version: Option<String>) -> Self {
        self.proc_version = proc_version;
        self
    }

    /// Build the context from parsed launcher arguments and the live process.
    pub fn from_args(args: LauncherArgs) -> Result<Self, LaunchError> {
        let spec: CommandSpec = args
            .command
            .parse()
            .map_err(|_| LaunchError::UnknownCommand(args.command.clone()))?;

        Ok(Self::from_process(spec, args.shell, args.shim, args.uname).with_args(args.args))
    }

    /// Context for `spec` under the live environment and host markers, without arguments.
    pub fn from_process(
        spec: CommandSpec,
        shell: ShellKind,
        shim_path: impl Into<PathBuf>,
        uname: Option<String>,
    ) -> Self {
        Self::new(spec, shell, shim_path)
            .with_env(LaunchEnv::from_process())
            .with_uname(uname)
            .with_proc_version(read_proc_version())
    }

    pub fn markers(&self) -> HostMarkers<'_> {
        HostMarkers {
            uname: self.uname.as_deref(),
            proc_version: self.proc_version.as_deref(),
            env: &self.env,
        }
    }

    /// Flavor of the invoking shell. Only POSIX stubs can run under an emulation layer.
    pub fn flavor(&self) -> ShellFlavor {
        match self.shell {
            ShellKind::Cmd => ShellFlavor::Native,
            ShellKind::Posix => flavor::detect(&self.markers()),
        }
    }

    pub fn translator(&self) -> Box<dyn PathTranslator> {
        flavor::translator(self.flavor(), &self.env)
    }

    /// Directory the stub was invoked from, in host syntax, without following symlinks.
    pub fn invoked_dir(&self, translator: &dyn PathTranslator) -> Option<PathBuf> {
        translator
            .host_path(&self.shim_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    pub fn trace_log(&self) -> Option<PathBuf> {
        self.env.get_non_empty(TRACE_LOG_VAR).map(PathBuf::from)
    }

    /// Whether argv redaction is disabled for the trace.
    pub fn raw_trace(&self) -> bool {
        self.env.get_str(LOG_OPTS_VAR) == Some("raw")
    }
}

fn read_proc_version() -> Option<String> {
    if cfg!(target_os = "linux") {
        std::fs::read_to_string("/proc/version").ok()
    } else {
        None
    }
}
