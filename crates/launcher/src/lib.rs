//! cmdshim launcher
//!
//! Finds the currently linked npm installation and runs one of its commands under the
//! node runtime, with the caller's argv, stdio, environment and termination passed
//! through exactly.
//!
//! ## Architecture
//!
//! A thin shell stub (rendered by [`render`]) execs `cmdshim-launch`, which:
//! 1. Selects the runtime: override variable, sibling of the stub, `PATH`
//! 2. Dereferences the stub and picks the first candidate layout holding the entry script,
//!    starting under the global prefix configured in the environment or an npmrc
//! 3. Translates paths for the shell emulation layer the stub ran under, if any
//! 4. Spawns the runtime, relays signals, and ends with the child's exit code or signal
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cmdshim_launcher::run_launcher;
//!
//! fn main() {
//!     match run_launcher() {
//!         Ok(termination) => termination.reproduce(),
//!         Err(err) => {
//!             eprintln!("cmdshim: {err}");
//!             std::process::exit(err.exit_code());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod error;
pub mod exec;
pub mod flavor;
pub mod install;
pub mod logger;
pub mod render;
pub mod runtime;

pub use context::{LaunchContext, LauncherArgs, ShellKind};
pub use error::LaunchError;
pub use exec::{launch, plan, run_launcher, LaunchPlan, Termination};
pub use flavor::ShellFlavor;
pub use install::{resolve_entry, Layout, Resolution};
pub use logger::init_logging;
pub use runtime::{locate_runtime, RuntimeSelection, RuntimeSource};

/// Launcher version, with the git short hash for builds from a checkout
pub const VERSION: &str = env!("CMDSHIM_VERSION");
