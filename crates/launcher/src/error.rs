//! Launch failures and the exit codes they map to.

use std::path::PathBuf;
use thiserror::Error;

use crate::install::Candidate;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid command name: {0:?}")]
    UnknownCommand(String),

    #[error("cannot resolve shim location {}: {source}", .path.display())]
    ShimPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not locate {entry} from {}; tried:{}", .shim.display(), format_tried(.tried))]
    Resolution {
        shim: PathBuf,
        entry: String,
        tried: Vec<Candidate>,
    },

    #[error("runtime '{name}' not found (set {override_var} or add it to PATH)")]
    RuntimeNotFound { name: String, override_var: String },

    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for {}: {source}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Exit status the launcher reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownCommand(_) => 2,
            Self::ShimPath { .. } | Self::Resolution { .. } => 1,
            Self::RuntimeNotFound { .. } => 127,
            Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
            Self::Spawn { .. } | Self::Wait { .. } => 126,
        }
    }

    /// Short machine-readable kind for trace records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::ShimPath { .. } => "shim_path",
            Self::Resolution { .. } => "resolution_failed",
            Self::RuntimeNotFound { .. } => "runtime_not_found",
            Self::Spawn { .. } => "spawn_failed",
            Self::Wait { .. } => "wait_failed",
        }
    }
}

fn format_tried(tried: &[Candidate]) -> String {
    tried
        .iter()
        .map(|c| format!("\n  {} ({})", c.path.display(), c.layout))
        .collect()
}
