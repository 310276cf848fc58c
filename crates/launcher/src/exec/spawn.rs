use cmdshim_common::LaunchEnv;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus};

use super::signals::SignalForwarder;
use crate::error::LaunchError;

/// Run `program` with `argv` under exactly `env`, inheriting stdio, and wait for it.
///
/// Signals aimed at the launcher are relayed for the child's whole lifetime. On Linux
/// the child is also told to receive SIGTERM should the launcher disappear first.
pub(crate) fn delegate(
    program: &Path,
    argv: &[OsString],
    env: &LaunchEnv,
) -> Result<ExitStatus, LaunchError> {
    let mut cmd = Command::new(program);
    cmd.args(argv).env_clear().envs(env.iter());

    #[cfg(target_os = "linux")]
    {
        use nix::sys::prctl;
        use nix::sys::signal::Signal;
        use nix::unistd::{getpid, getppid};
        use std::os::unix::process::CommandExt;

        let launcher = getpid();
        unsafe {
            cmd.pre_exec(move || {
                // Safety: prctl and getppid are async-signal-safe
                prctl::set_pdeathsig(Signal::SIGTERM)?;
                // Launcher already gone before the death signal was armed
                if getppid() != launcher {
                    return Err(nix::errno::Errno::ESRCH.into());
                }
                Ok(())
            });
        }
    }

    let forwarder = match SignalForwarder::install() {
        Ok(forwarder) => Some(forwarder),
        Err(err) => {
            log::warn!("signal relay unavailable: {err}");
            None
        }
    };

    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;
    log::debug!("spawned {} as pid {}", program.display(), child.id());

    if let Some(forwarder) = &forwarder {
        forwarder.attach(child.id());
    }

    let status = child.wait().map_err(|source| LaunchError::Wait {
        program: program.to_path_buf(),
        source,
    });

    if let Some(forwarder) = &forwarder {
        forwarder.detach();
    }

    status
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_child_sees_only_the_given_environment() {
        let env = LaunchEnv::from_pairs([("ONLY_VAR", "present")]);
        let status = delegate(
            Path::new("/bin/sh"),
            &[
                OsString::from("-c"),
                OsString::from(r#"[ "$ONLY_VAR" = present ] && [ -z "${HOME+x}" ]"#),
            ],
            &env,
        )
        .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_exit_code_passes_through() {
        let status = delegate(
            Path::new("/bin/sh"),
            &[OsString::from("-c"), OsString::from("exit 42")],
            &LaunchEnv::default(),
        )
        .unwrap();
        assert_eq!(status.code(), Some(42));
    }

    #[test]
    fn test_missing_program_is_spawn_not_found() {
        let err = delegate(
            &PathBuf::from("/nonexistent/cmdshim/node"),
            &[],
            &LaunchEnv::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert_eq!(err.exit_code(), 127);
    }
}
