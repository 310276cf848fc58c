//! cmdshim operator CLI: render launcher stubs and explain launch decisions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdshim_common::CommandSpec;
use cmdshim_launcher::{
    flavor::PathTranslator, init_logging, install, locate_runtime, render, resolve_entry,
    LaunchContext, LaunchError, ShellKind,
};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cmdshim")]
#[command(version = cmdshim_launcher::VERSION, about = "Launcher stubs for the linked npm installation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print or write the stub for a command
    Render {
        /// Command the stub launches (npm, npx)
        command: CommandSpec,

        /// Host shell syntax of the stub
        #[arg(long, value_enum, default_value_t = ShellKind::Posix)]
        shell: ShellKind,

        /// Write the stub here instead of stdout (directories get the default file name)
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show which runtime and entry script a stub would use, without launching anything
    Explain {
        /// Command to explain (npm, npx)
        command: CommandSpec,

        /// Stub path, as a shell would pass it
        #[arg(long, value_name = "PATH")]
        shim: PathBuf,

        /// `uname -s` of the host running the stub
        #[arg(long)]
        uname: Option<String>,

        /// Host shell syntax of the stub
        #[arg(long, value_enum, default_value_t = ShellKind::Posix)]
        shell: ShellKind,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            command,
            shell,
            output,
        } => match output {
            Some(path) => {
                let path = if path.is_dir() {
                    path.join(render::file_name(&command, shell))
                } else {
                    path
                };
                render::write_stub(&command, shell, &path)?;
                eprintln!("wrote {}", path.display());
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(render::render(&command, shell).as_bytes())
                    .context("writing stub to stdout")?;
            }
        },
        Command::Explain {
            command,
            shim,
            uname,
            shell,
        } => {
            let ctx = LaunchContext::from_process(command, shell, shim, uname);
            let report = explain(&ctx);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn explain(ctx: &LaunchContext) -> Value {
    let translator = ctx.translator();
    let host_shim = translator.host_path(&ctx.shim_path);
    let runtime = locate_runtime(
        &ctx.spec,
        &ctx.env,
        ctx.invoked_dir(translator.as_ref()).as_deref(),
    );

    let mut report = json!({
        "command": ctx.spec,
        "entry_script": ctx.spec.entry_script(),
        "shell": ctx.shell.as_str(),
        "flavor": translator.flavor().as_str(),
        "shim_path": ctx.shim_path.display().to_string(),
        "host_shim_path": host_shim.display().to_string(),
        "runtime": {
            "program": runtime.program.display().to_string(),
            "source": runtime.source.as_str(),
            "located": runtime.is_located(),
            "override_var": ctx.spec.runtime_override_var(),
        },
        "entry": Value::Null,
    });

    match resolve_entry(&ctx.spec, &host_shim, &ctx.env) {
        Ok(resolution) => {
            report["resolved_shim"] = json!(resolution.resolved_shim.display().to_string());
            report["candidates"] = candidates_json(&resolution.tried);
            if let Some(prefix) = &resolution.prefix {
                report["global_prefix"] = json!({
                    "path": prefix.path.display().to_string(),
                    "origin": prefix.origin.to_string(),
                });
            }
            report["entry"] = json!(resolution.entry.display().to_string());
            report["layout"] = json!(resolution.layout.as_str());
            report["entry_arg"] =
                json!(translator.runtime_arg(&resolution.entry, &runtime).to_string_lossy());
        }
        Err(err) => {
            if let LaunchError::Resolution { shim, tried, .. } = &err {
                report["resolved_shim"] = json!(shim.display().to_string());
                report["candidates"] = candidates_json(tried);
            }
            report["error"] = json!(err.to_string());
        }
    }

    report
}

fn candidates_json(tried: &[install::Candidate]) -> Value {
    tried
        .iter()
        .map(|c| {
            json!({
                "layout": c.layout.as_str(),
                "path": c.path.display().to_string(),
                "exists": c.path.is_file(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdshim_common::LaunchEnv;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_render_and_explain() {
        let cli = Cli::try_parse_from(["cmdshim", "render", "npx", "--shell", "cmd"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Render { ref command, shell: ShellKind::Cmd, output: None } if command.name() == "npx"
        ));

        let cli = Cli::try_parse_from([
            "cmdshim", "explain", "npm", "--shim", "/usr/bin/npm", "--uname", "MSYS_NT-10.0",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Explain { uname: Some(_), .. }));

        assert!(Cli::try_parse_from(["cmdshim", "render", "../npm"]).is_err());
    }

    #[test]
    fn test_explain_reports_candidates_and_choice() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path();
        fs::create_dir_all(prefix.join("bin")).unwrap();
        fs::write(prefix.join("bin/npm"), "").unwrap();
        let entry = prefix.join("lib/node_modules/npm/bin/npm-cli.js");
        fs::create_dir_all(entry.parent().unwrap()).unwrap();
        fs::write(&entry, "").unwrap();

        let ctx = LaunchContext::new(CommandSpec::primary(), ShellKind::Posix, prefix.join("bin/npm"))
            .with_env(LaunchEnv::from_pairs([("NPM_SHIM_NODE", "/opt/node")]));
        let report = explain(&ctx);

        assert_eq!(report["runtime"]["source"], "override");
        assert_eq!(report["layout"], "prefix-lib");
        assert_eq!(report["candidates"].as_array().unwrap().len(), 3);
        assert_eq!(report["candidates"][0]["exists"], false);
        assert_eq!(report["candidates"][2]["exists"], true);
    }

    #[test]
    fn test_explain_reports_npmrc_prefix() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nodejs");
        fs::create_dir_all(root.join("node_modules/npm/bin")).unwrap();
        fs::write(root.join("npx"), "").unwrap();
        fs::write(root.join("node_modules/npm/bin/npx-cli.js"), "").unwrap();
        let global = temp.path().join("global/lib/node_modules/npm/bin");
        fs::create_dir_all(&global).unwrap();
        fs::write(global.join("npx-cli.js"), "").unwrap();
        let rc = temp.path().join("user-npmrc");
        fs::write(&rc, format!("prefix={}\n", temp.path().join("global").display())).unwrap();

        let ctx = LaunchContext::new(CommandSpec::secondary(), ShellKind::Posix, root.join("npx"))
            .with_env(LaunchEnv::from_pairs([("npm_config_userconfig", &rc)]));
        let report = explain(&ctx);

        assert_eq!(report["command"], "npx");
        assert_eq!(report["layout"], "global-prefix");
        assert_eq!(report["global_prefix"]["origin"], rc.display().to_string());
        assert_eq!(report["candidates"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_explain_lists_candidates_on_failure() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        fs::write(temp.path().join("bin/npm"), "").unwrap();

        let ctx = LaunchContext::new(CommandSpec::primary(), ShellKind::Posix, temp.path().join("bin/npm"));
        let report = explain(&ctx);

        assert_eq!(report["entry"], Value::Null);
        assert!(report["error"].as_str().unwrap().contains("npm-cli.js"));
        let candidates = report["candidates"].as_array().unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c["exists"] == false));
    }
}
