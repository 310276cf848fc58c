use std::{env, process::Command};

fn main() {
    // Re-run if version changes
    println!("cargo:rerun-if-changed=Cargo.toml");

    let version = env::var("CARGO_PKG_VERSION").unwrap();

    // Non-git builds (e.g. from crates.io) get the bare version
    let git_hash = if std::path::Path::new("../../.git").exists() {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    } else {
        None
    };

    let version_string = match git_hash {
        Some(hash) => format!("{version}-{hash}"),
        None => version,
    };

    // Stamped into rendered stub headers and the launcher's own --version
    println!("cargo:rustc-env=CMDSHIM_VERSION={version_string}");
    println!(
        "cargo:rustc-env=CMDSHIM_BUILD_DATE={}",
        chrono::Utc::now().format("%Y-%m-%d")
    );
}
