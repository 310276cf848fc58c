//! Launch pipeline: locate the runtime, resolve the entry script, delegate, and
//! reproduce the child's termination.

mod signals;
mod spawn;

use clap::Parser;
use cmdshim_common::{CommandSpec, LaunchEnv, RUNTIME_NAME};
use std::ffi::OsString;
use std::process::ExitStatus;
use std::time::Instant;

use crate::context::{LaunchContext, LauncherArgs};
use crate::error::LaunchError;
use crate::flavor::ShellFlavor;
use crate::install::{resolve_entry, Resolution};
use crate::logger::{log_failure, log_launch, TraceMetadata};
use crate::runtime::{locate_runtime, RuntimeSelection};

/// How the delegated process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    /// Killed by this signal number (Unix only)
    Signaled(i32),
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::Exited(status.code().unwrap_or(1))
    }
}

impl Termination {
    /// Shell-style status: the exit code, or `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        match *self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match *self {
            Self::Exited(_) => None,
            Self::Signaled(signal) => Some(signal),
        }
    }

    /// End the launcher the same way the child ended.
    pub fn reproduce(self) -> ! {
        match self {
            Self::Exited(code) => std::process::exit(code),
            #[cfg(unix)]
            Self::Signaled(signal) => signals::raise_default(signal),
            #[cfg(not(unix))]
            Self::Signaled(signal) => std::process::exit(128 + signal),
        }
    }
}

/// Everything decided before the runtime is spawned
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub spec: CommandSpec,
    pub runtime: RuntimeSelection,
    pub flavor: ShellFlavor,
    pub resolution: Resolution,
    /// Entry path as the runtime must see it
    pub entry_arg: OsString,
}

impl LaunchPlan {
    /// Runtime argument vector: the entry script followed by the caller's arguments verbatim.
    pub fn argv(&self, user_args: &[OsString]) -> Vec<OsString> {
        std::iter::once(self.entry_arg.clone())
            .chain(user_args.iter().cloned())
            .collect()
    }

    /// Child environment. A consumed runtime override is removed so nested launches
    /// select their own runtime; everything else passes through.
    pub fn child_env(&self, env: &LaunchEnv) -> LaunchEnv {
        if self.runtime.consumed_override() {
            env.without(&self.spec.runtime_override_var())
        } else {
            env.clone()
        }
    }
}

/// Decide what to run without running it.
///
/// A runtime that could not be located fails here, before the installation is
/// looked at, so a missing runtime is reported even when no entry script exists.
pub fn plan(ctx: &LaunchContext) -> Result<LaunchPlan, LaunchError> {
    let translator = ctx.translator();
    let flavor = translator.flavor();

    let invoked_dir = ctx.invoked_dir(translator.as_ref());
    let runtime = locate_runtime(&ctx.spec, &ctx.env, invoked_dir.as_deref());
    if !runtime.is_located() {
        return Err(LaunchError::RuntimeNotFound {
            name: RUNTIME_NAME.to_string(),
            override_var: ctx.spec.runtime_override_var(),
        });
    }

    let shim = translator.host_path(&ctx.shim_path);
    let resolution = resolve_entry(&ctx.spec, &shim, &ctx.env)?;
    let entry_arg = translator.runtime_arg(&resolution.entry, &runtime);

    log::debug!(
        "{}: runtime {} ({}), entry {} ({}), flavor {flavor}",
        ctx.spec,
        runtime.program.display(),
        runtime.source,
        resolution.entry.display(),
        resolution.layout,
    );

    Ok(LaunchPlan {
        spec: ctx.spec.clone(),
        runtime,
        flavor,
        resolution,
        entry_arg,
    })
}

/// Plan and delegate one invocation, recording it in the trace log when configured.
pub fn launch(ctx: &LaunchContext) -> Result<Termination, LaunchError> {
    let meta = TraceMetadata::start();
    let started = Instant::now();

    let result = plan(ctx).and_then(|plan| {
        let status = spawn::delegate(
            &plan.runtime.program,
            &plan.argv(&ctx.args),
            &plan.child_env(&ctx.env),
        )?;
        Ok((plan, Termination::from(status)))
    });

    if let Some(log_path) = ctx.trace_log() {
        let meta = meta.finish(started.elapsed());
        let written = match &result {
            Ok((plan, termination)) => log_launch(&log_path, ctx, plan, *termination, &meta),
            Err(err) => log_failure(&log_path, ctx, err, &meta),
        };
        if let Err(e) = written {
            log::warn!("failed to write trace record: {e:#}");
        }
    }

    result.map(|(_, termination)| termination)
}

/// Entry point of the `cmdshim-launch` binary.
pub fn run_launcher() -> Result<Termination, LaunchError> {
    let args = LauncherArgs::parse();
    let ctx = LaunchContext::from_args(args)?;
    launch(&ctx)
}
