//! Run commands with the resolved configuration merged into their environment.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::config::LaunchConfig;
use crate::exit_codes;

/// String-form command used to start the service, split on whitespace.
pub const SERVICE_BIN_VAR: &str = "DECAPI_BIN";
/// Executable name of the decompile service.
pub const SERVICE_BIN_NAME: &str = "decapi";

/// Split a string-form command line on whitespace.
pub fn split_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Program (plus leading args) that starts the service.
///
/// `DECAPI_BIN` wins; otherwise a service binary installed next to the launcher;
/// otherwise the bare name, resolved through `PATH`.
pub fn service_program<F>(lookup: F, launcher_exe: Option<&Path>) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(line) = lookup(SERVICE_BIN_VAR) {
        let argv = split_command(&line);
        if !argv.is_empty() {
            return argv;
        }
    }
    if let Some(sibling) = launcher_exe.and_then(sibling_service_binary) {
        return vec![sibling.to_string_lossy().into_owned()];
    }
    vec![SERVICE_BIN_NAME.to_string()]
}

fn sibling_service_binary(launcher_exe: &Path) -> Option<PathBuf> {
    let candidate = launcher_exe
        .parent()?
        .join(format!("{}{}", SERVICE_BIN_NAME, std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

/// Full service command line for `config`.
pub fn service_command(program: &[String], config: &LaunchConfig) -> Vec<String> {
    let mut argv = program.to_vec();
    argv.extend([
        "--host".to_string(),
        config.host.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ]);
    if config.autoreload {
        argv.push("--reload".to_string());
    }
    argv
}

/// Run `argv` to completion and return its exit code.
///
/// The child inherits the launcher's environment with every set configuration
/// variable overriding it and every unset one removed. The command line is
/// echoed to stderr first.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or_default()))]
pub fn run_command(argv: &[String], config: &LaunchConfig) -> Result<i32> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty command");
    };

    eprintln!("{}", argv.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args).envs(config.env_overrides());
    for name in config.env_removals() {
        cmd.env_remove(name);
    }

    debug!("spawning command");
    let status = cmd
        .status()
        .with_context(|| format!("run {}", argv.join(" ")))?;
    let code = exit_code(status);
    if code == exit_codes::OK {
        info!("command finished");
    } else {
        warn!(exit_code = code, "command failed");
    }
    Ok(code)
}

/// Map a child's status to the code the launcher should exit with.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_codes::SIGNAL_BASE + signal;
        }
    }
    exit_codes::INVALID
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_command_collapses_whitespace() {
        assert_eq!(
            split_command("  cargo run  -p decapi --\t"),
            strings(&["cargo", "run", "-p", "decapi", "--"])
        );
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn service_command_carries_host_and_port() {
        let cfg = LaunchConfig {
            port: 9999,
            ..LaunchConfig::default()
        };
        assert_eq!(
            service_command(&strings(&["decapi"]), &cfg),
            strings(&["decapi", "--host", "0.0.0.0", "--port", "9999"])
        );
    }

    #[test]
    fn service_command_adds_reload_only_when_enabled() {
        let mut cfg = LaunchConfig::default();
        assert!(!service_command(&strings(&["decapi"]), &cfg).contains(&"--reload".to_string()));
        cfg.autoreload = true;
        assert_eq!(
            service_command(&strings(&["decapi"]), &cfg).last().map(String::as_str),
            Some("--reload")
        );
    }

    #[test]
    fn service_program_prefers_override() {
        let program = service_program(
            |name| (name == SERVICE_BIN_VAR).then(|| "cargo run -p decapi --".to_string()),
            None,
        );
        assert_eq!(program, strings(&["cargo", "run", "-p", "decapi", "--"]));
    }

    #[test]
    fn service_program_falls_back_to_sibling_then_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let launcher = temp.path().join("entrypoint");
        assert_eq!(
            service_program(|_| None, Some(&launcher)),
            strings(&[SERVICE_BIN_NAME])
        );

        let sibling = temp
            .path()
            .join(format!("{}{}", SERVICE_BIN_NAME, std::env::consts::EXE_SUFFIX));
        std::fs::write(&sibling, "").expect("write sibling");
        assert_eq!(
            service_program(|_| None, Some(&launcher)),
            vec![sibling.to_string_lossy().into_owned()]
        );
    }

    #[test]
    fn empty_command_is_an_error() {
        assert!(run_command(&[], &LaunchConfig::default()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_passes_through_and_maps_signals() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 128 + 9);
    }
}
