//! Diagnostics and the structured invocation trace
//!
//! Human diagnostics go through `log`/`env_logger` and are off unless `CMDSHIM_LOG` asks
//! for them, so a launched command's stderr is byte-identical to running it directly.
//! The optional JSONL trace appends one record per launch, with credential redaction.

use anyhow::{Context, Result};
use cmdshim_common::log_schema;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::env;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::context::{LaunchContext, LOG_FILTER_VAR};
use crate::error::LaunchError;
use crate::exec::{LaunchPlan, Termination};

/// Initialize `env_logger` from `CMDSHIM_LOG`, defaulting to silence.
pub fn init_logging() {
    let env = env_logger::Env::default().filter_or(LOG_FILTER_VAR, "off");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(false)
        .try_init();
}

/// Timing and identity for one launch
#[derive(Debug, Clone, Copy)]
pub struct TraceMetadata {
    pub invocation_id: Uuid,
    pub timestamp: SystemTime,
    pub duration: Duration,
}

impl TraceMetadata {
    pub fn start() -> Self {
        Self {
            invocation_id: Uuid::now_v7(),
            timestamp: SystemTime::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn finish(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Record a completed delegation.
pub fn log_launch(
    log_path: &Path,
    ctx: &LaunchContext,
    plan: &LaunchPlan,
    termination: Termination,
    meta: &TraceMetadata,
) -> Result<()> {
    let mut entry = base_entry(ctx, meta);
    entry["shim_resolved"] = json!(plan.resolution.resolved_shim.display().to_string());
    entry["entry"] = json!(plan.resolution.entry.display().to_string());
    entry["entry_arg"] = json!(plan.entry_arg.to_string_lossy());
    entry["layout"] = json!(plan.resolution.layout.as_str());
    if let Some(prefix) = &plan.resolution.prefix {
        entry["global_prefix"] = json!(prefix.path.display().to_string());
    }
    entry["runtime"] = json!(plan.runtime.program.display().to_string());
    entry["runtime_source"] = json!(plan.runtime.source.as_str());
    entry["flavor"] = json!(plan.flavor.as_str());
    entry[log_schema::EXIT_CODE] = json!(termination.exit_code());
    if let Some(signal) = termination.signal() {
        entry[log_schema::TERM_SIGNAL] = json!(signal);
    }
    write_log_entry(log_path, &entry)
}

/// Record a launch that never reached (or never finished) delegation.
pub fn log_failure(
    log_path: &Path,
    ctx: &LaunchContext,
    error: &LaunchError,
    meta: &TraceMetadata,
) -> Result<()> {
    let mut entry = base_entry(ctx, meta);
    entry["flavor"] = json!(ctx.flavor().as_str());
    entry["error"] = json!(error.kind());
    entry["message"] = json!(error.to_string());
    entry[log_schema::EXIT_CODE] = json!(error.exit_code());
    write_log_entry(log_path, &entry)
}

fn base_entry(ctx: &LaunchContext, meta: &TraceMetadata) -> Value {
    let argv: Vec<String> = std::iter::once(ctx.spec.name().to_string())
        .chain(redact_sensitive_argv(&ctx.args, ctx.raw_trace()))
        .collect();

    let mut entry = json!({
        "argv": argv,
        "shell": ctx.shell.as_str(),
        "shim_path": ctx.shim_path.display().to_string(),
        "pid": std::process::id(),
        "hostname": gethostname::gethostname().to_string_lossy().to_string(),
        "platform": env::consts::OS,
        "isatty_stdin": atty::is(atty::Stream::Stdin),
        "isatty_stdout": atty::is(atty::Stream::Stdout),
        "isatty_stderr": atty::is(atty::Stream::Stderr),
        "launcher_fingerprint": launcher_fingerprint(),
        "build": crate::VERSION,
        "build_date": env!("CMDSHIM_BUILD_DATE"),
    });
    entry[log_schema::TIMESTAMP] = json!(format_timestamp(meta.timestamp));
    entry[log_schema::INVOCATION_ID] = json!(meta.invocation_id.to_string());
    entry[log_schema::COMMAND] = json!(ctx.spec);
    entry[log_schema::COMPONENT] = json!("launcher");
    entry[log_schema::DURATION_MS] = json!(meta.duration.as_millis() as u64);

    if let Some(uname) = &ctx.uname {
        entry["uname"] = json!(uname);
    }

    #[cfg(unix)]
    {
        entry["ppid"] = json!(nix::unistd::getppid().as_raw());
    }

    entry
}

/// Append one JSON line to `log_path`, creating the file if needed.
pub fn write_log_entry(log_path: &Path, entry: &Value) -> Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating trace directory {}", parent.display()))?;
    }

    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening trace log {}", log_path.display()))?;
    // Single write so concurrent launchers never interleave within a line
    file.write_all(line.as_bytes())
        .with_context(|| format!("writing trace log {}", log_path.display()))?;
    Ok(())
}

/// Redact credentials in an argument vector, including the value following a sensitive
/// flag. With `raw` set everything is returned unchanged.
pub fn redact_sensitive_argv(argv: &[OsString], raw: bool) -> Vec<String> {
    if raw {
        return argv
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
    }

    let mut result = Vec::with_capacity(argv.len());
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].to_string_lossy();
        let redacted_arg = redact_sensitive(&arg);
        result.push(redacted_arg.clone());

        // A bare sensitive flag hides the value after it
        if redacted_arg == "***" && i + 1 < argv.len() {
            let next_arg = argv[i + 1].to_string_lossy();
            if arg.eq_ignore_ascii_case("-H") || arg.eq_ignore_ascii_case("--header") {
                result.push(redact_header_value(&next_arg));
            } else {
                result.push("***".to_string());
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    result
}

const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "password",
    "secret",
    "key",
    "apikey",
    "access-key",
    "secret-key",
    "_auth",
    "_authtoken",
];

const SENSITIVE_FLAGS: &[&str] = &[
    "--token",
    "--password",
    "--secret",
    "--apikey",
    "--access-key",
    "--secret-key",
    "--auth-token",
    "--otp",
    "--_authToken",
    "-H",
    "--header",
];

fn redact_sensitive(arg: &str) -> String {
    // `key=value` and `--key=value`, including registry-scoped `//host/:_authToken=...`
    if let Some((name, _)) = arg.split_once('=') {
        let lowered = name.to_ascii_lowercase();
        let bare = lowered.trim_start_matches('-');
        let last = bare.rsplit(':').next().unwrap_or(bare);
        if SENSITIVE_KEYS
            .iter()
            .any(|key| last == *key || last.ends_with(&format!("-{key}")) || last.ends_with(&format!("_{key}")))
        {
            return format!("{name}=***");
        }
    }

    if SENSITIVE_FLAGS.iter().any(|flag| arg.eq_ignore_ascii_case(flag)) {
        return "***".to_string();
    }

    arg.to_string()
}

fn redact_header_value(header_value: &str) -> String {
    const SENSITIVE_HEADER_KEYS: &[&str] = &[
        "authorization",
        "proxy-authorization",
        "x-api-key",
        "x-auth-token",
        "npm-otp",
        "cookie",
    ];

    if let Some((key, _)) = header_value.split_once(':') {
        let key_lower = key.trim().to_ascii_lowercase();
        if SENSITIVE_HEADER_KEYS.contains(&key_lower.as_str())
            || key_lower.contains("token")
            || key_lower.contains("secret")
        {
            return format!("{}: ***", key.trim());
        }
    }

    header_value.to_string()
}

/// Format timestamp as RFC3339 with milliseconds
pub fn format_timestamp(timestamp: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = timestamp.into();
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// SHA-256 of the running launcher binary, computed once per process.
pub fn launcher_fingerprint() -> String {
    use once_cell::sync::Lazy;

    static LAUNCHER_FINGERPRINT: Lazy<String> = Lazy::new(|| {
        env::current_exe()
            .and_then(std::fs::read)
            .map(|bytes| format!("sha256:{:x}", Sha256::digest(&bytes)))
            .unwrap_or_else(|_| "sha256:unknown".to_string())
    });

    LAUNCHER_FINGERPRINT.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ShellKind;
    use cmdshim_common::CommandSpec;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_sensitive_arg_redaction() {
        assert_eq!(redact_sensitive("install"), "install");
        assert_eq!(redact_sensitive("token=secret123"), "token=***");
        assert_eq!(redact_sensitive("--password=hunter2"), "--password=***");
        assert_eq!(
            redact_sensitive("//registry.npmjs.org/:_authToken=abc"),
            "//registry.npmjs.org/:_authToken=***"
        );
        assert_eq!(redact_sensitive("--registry=https://r.example"), "--registry=https://r.example");
        assert_eq!(redact_sensitive("--otp"), "***");
        assert_eq!(redact_sensitive("-p"), "-p");
    }

    #[test]
    fn test_package_flag_is_not_a_credential() {
        let redacted = redact_sensitive_argv(&args(&["-p", "typescript", "tsc", "--init"]), false);
        assert_eq!(redacted, vec!["-p", "typescript", "tsc", "--init"]);
    }

    #[test]
    fn test_flag_value_redaction() {
        let redacted = redact_sensitive_argv(
            &args(&["publish", "--otp", "123456", "--tag", "next"]),
            false,
        );
        assert_eq!(redacted, vec!["publish", "***", "***", "--tag", "next"]);
    }

    #[test]
    fn test_header_flag_redaction() {
        let redacted = redact_sensitive_argv(
            &args(&[
                "-H",
                "Authorization: Bearer secret123",
                "--header",
                "Accept: application/json",
            ]),
            false,
        );
        assert_eq!(
            redacted,
            vec!["***", "Authorization: ***", "***", "Accept: application/json"]
        );
    }

    #[test]
    fn test_raw_mode_keeps_everything() {
        let input = args(&["--token", "abc", "password=x"]);
        assert_eq!(
            redact_sensitive_argv(&input, true),
            vec!["--token", "abc", "password=x"]
        );
    }

    #[test]
    fn test_binary_fingerprint() {
        let fingerprint = launcher_fingerprint();
        assert!(fingerprint.starts_with("sha256:"));
        if fingerprint != "sha256:unknown" {
            assert_eq!(fingerprint.len(), 71);
            assert!(fingerprint.chars().skip(7).all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_failure_record_is_one_json_line() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("nested/trace.jsonl");
        let ctx = LaunchContext::new(CommandSpec::secondary(), ShellKind::Posix, "/opt/bin/npx")
            .with_args(["--token", "abc", "create", "vite"]);
        let err = LaunchError::RuntimeNotFound {
            name: "node".to_string(),
            override_var: "NPX_SHIM_NODE".to_string(),
        };

        log_failure(&log, &ctx, &err, &TraceMetadata::start()).unwrap();
        log_failure(&log, &ctx, &err, &TraceMetadata::start()).unwrap();

        let contents = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["command"], "npx");
        assert_eq!(record["component"], "launcher");
        assert_eq!(record["error"], "runtime_not_found");
        assert_eq!(record["exit_code"], 127);
        assert_eq!(record["argv"], json!(["npx", "***", "***", "create", "vite"]));
        assert_ne!(record["invocation_id"], serde_json::from_str::<Value>(lines[1]).unwrap()["invocation_id"]);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = format_timestamp(SystemTime::UNIX_EPOCH + Duration::from_millis(1_500));
        assert_eq!(ts, "1970-01-01T00:00:01.500Z");
    }
}
