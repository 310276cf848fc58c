//! Stub rendering: one template per host shell, parameterized by command name
//!
//! The stubs carry no logic beyond finding `cmdshim-launch` and handing over the
//! command name, the shell kind, their own path and the untouched argument list.
//! Two stubs of the same shell therefore differ only where the command name appears.

use anyhow::{Context, Result};
use cmdshim_common::CommandSpec;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::context::{ShellKind, LAUNCHER_VAR};

const POSIX_TEMPLATE: &str = r#"#!/bin/sh
# {{command}}: launcher stub generated by cmdshim {{version}}; do not edit
(set -o igncr) 2>/dev/null && set -o igncr; # cygwin: tolerate CRLF

basedir=$(dirname "$(echo "$0" | sed -e 's,\\,/,g')")

if [ -n "${{launcher_var}}" ]; then
  {{COMMAND}}_LAUNCHER="${{launcher_var}}"
elif [ -x "$basedir/cmdshim-launch" ]; then
  {{COMMAND}}_LAUNCHER="$basedir/cmdshim-launch"
else
  {{COMMAND}}_LAUNCHER=cmdshim-launch
fi

exec "${{COMMAND}}_LAUNCHER" --command {{command}} --shell posix --uname "$(uname -s 2>/dev/null)" --shim "$0" -- "$@"
"#;

const CMD_TEMPLATE: &str = r#"@ECHO off
REM launcher stub generated by cmdshim {{version}}; do not edit
SETLOCAL
IF DEFINED {{launcher_var}} (
  SET "{{COMMAND}}_LAUNCHER=%{{launcher_var}}%"
) ELSE IF EXIST "%~dp0cmdshim-launch.exe" (
  SET "{{COMMAND}}_LAUNCHER=%~dp0cmdshim-launch.exe"
) ELSE (
  SET "{{COMMAND}}_LAUNCHER=cmdshim-launch.exe"
)
"%{{COMMAND}}_LAUNCHER%" --command {{command}} --shell cmd --shim "%~f0" -- %*
EXIT /b %ERRORLEVEL%
"#;

/// Render the stub for `spec` in `shell` syntax.
pub fn render(spec: &CommandSpec, shell: ShellKind) -> String {
    let template = match shell {
        ShellKind::Posix => POSIX_TEMPLATE,
        ShellKind::Cmd => CMD_TEMPLATE,
    };

    let rendered = template
        .replace("{{version}}", crate::VERSION)
        .replace("{{launcher_var}}", LAUNCHER_VAR)
        .replace("{{command}}", spec.name())
        .replace("{{COMMAND}}", &spec.name().to_ascii_uppercase().replace('-', "_"));

    match shell {
        ShellKind::Posix => rendered,
        // cmd.exe mis-parses labels and blocks in LF-only files
        ShellKind::Cmd => rendered.replace('\n', "\r\n"),
    }
}

/// File name a stub is installed under.
pub fn file_name(spec: &CommandSpec, shell: ShellKind) -> String {
    match shell {
        ShellKind::Posix => spec.name().to_string(),
        ShellKind::Cmd => format!("{}.cmd", spec.name()),
    }
}

/// Write the rendered stub to `path`, replacing it atomically. POSIX stubs are made
/// executable.
pub fn write_stub(spec: &CommandSpec, shell: ShellKind, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut staged = tempfile::Builder::new()
        .prefix(".cmdshim-stub")
        .tempfile_in(dir)
        .with_context(|| format!("staging stub in {}", dir.display()))?;
    staged
        .write_all(render(spec, shell).as_bytes())
        .context("writing stub")?;

    #[cfg(unix)]
    if shell == ShellKind::Posix {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))
            .context("making stub executable")?;
    }

    staged
        .persist(path)
        .with_context(|| format!("installing stub at {}", path.display()))?;
    log::debug!("wrote {shell} stub for {spec} to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Positions where two equally long renders differ.
    fn differing_chars(a: &str, b: &str) -> Vec<(char, char)> {
        assert_eq!(a.len(), b.len(), "renders must be the same length");
        a.chars()
            .zip(b.chars())
            .filter(|(x, y)| x != y)
            .collect()
    }

    #[test]
    fn test_posix_stubs_differ_only_by_command_letter() {
        let npm = render(&CommandSpec::primary(), ShellKind::Posix);
        let npx = render(&CommandSpec::secondary(), ShellKind::Posix);
        let diffs = differing_chars(&npm, &npx);
        assert_eq!(diffs.len(), 6);
        assert!(diffs
            .iter()
            .all(|&(a, b)| matches!((a, b), ('m', 'x') | ('M', 'X'))));
    }

    #[test]
    fn test_cmd_stubs_differ_only_by_command_letter() {
        let npm = render(&CommandSpec::primary(), ShellKind::Cmd);
        let npx = render(&CommandSpec::secondary(), ShellKind::Cmd);
        let diffs = differing_chars(&npm, &npx);
        assert_eq!(diffs.len(), 5);
        assert!(diffs
            .iter()
            .all(|&(a, b)| matches!((a, b), ('m', 'x') | ('M', 'X'))));
    }

    #[test]
    fn test_cmd_stub_uses_crlf() {
        let stub = render(&CommandSpec::primary(), ShellKind::Cmd);
        assert!(stub.starts_with("@ECHO off\r\n"));
        assert!(!stub.replace("\r\n", "").contains('\n'));
        assert!(stub.contains("--command npm --shell cmd"));
        assert!(stub.contains(&format!("IF DEFINED {LAUNCHER_VAR} (")));
    }

    #[test]
    fn test_posix_stub_hands_over_everything() {
        let stub = render(&CommandSpec::secondary(), ShellKind::Posix);
        assert!(stub.starts_with("#!/bin/sh\n"));
        assert!(stub.contains(crate::VERSION));
        assert!(stub.contains(
            r#"exec "$NPX_LAUNCHER" --command npx --shell posix --uname "$(uname -s 2>/dev/null)" --shim "$0" -- "$@""#
        ));
        assert!(stub.contains(&format!(r#"NPX_LAUNCHER="${LAUNCHER_VAR}""#)));
        assert!(!stub.contains("{{"));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(&CommandSpec::primary(), ShellKind::Posix), "npm");
        assert_eq!(file_name(&CommandSpec::secondary(), ShellKind::Cmd), "npx.cmd");
    }

    #[test]
    fn test_write_stub_replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin/npm");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale").unwrap();

        write_stub(&CommandSpec::primary(), ShellKind::Posix, &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, render(&CommandSpec::primary(), ShellKind::Posix));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".cmdshim-stub"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
