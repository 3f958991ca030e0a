//! Dispatch on the shape of the launcher's arguments.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{LaunchConfig, SERVE_MODE};
use crate::exit_codes;
use crate::process::{run_command, service_command};
use crate::snapshot::{SnapshotPaths, persist};

/// What the launcher was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// No arguments: start whatever `RUN_MODE` selects.
    Configured,
    /// The arguments were exactly the serve token.
    Serve,
    /// Anything else: run the arguments as a command.
    Command(Vec<String>),
}

impl Invocation {
    pub fn from_args(args: &[String]) -> Self {
        if args.join(" ").trim() == SERVE_MODE {
            Invocation::Serve
        } else if args.is_empty() {
            Invocation::Configured
        } else {
            Invocation::Command(args.to_vec())
        }
    }
}

/// Everything resolved at startup.
#[derive(Debug, Clone)]
pub struct Launcher {
    pub config: LaunchConfig,
    pub paths: SnapshotPaths,
    /// Program (and leading args) that starts the service.
    pub service_program: Vec<String>,
}

impl Launcher {
    /// Persist the snapshot, then start the service or the command. Returns the exit code.
    pub fn run(mut self, invocation: Invocation) -> Result<i32> {
        match invocation {
            Invocation::Serve => {
                self.config.run_mode = Some(SERVE_MODE.to_string());
                persist(&self.config, &self.paths)?;
                self.run_server(SERVE_MODE)
            }
            Invocation::Command(argv) => {
                self.config.run_mode = None;
                persist(&self.config, &self.paths)?;
                run_command(&argv, &self.config)
            }
            Invocation::Configured => {
                persist(&self.config, &self.paths)?;
                let mode = self.config.run_mode.clone().unwrap_or_default();
                self.run_server(&mode)
            }
        }
    }

    fn run_server(&self, mode: &str) -> Result<i32> {
        if mode != SERVE_MODE {
            warn!(run_mode = mode, "unknown run mode, nothing to start");
            return Ok(exit_codes::OK);
        }
        info!(
            host = %self.config.host,
            port = self.config.port,
            reload = self.config.autoreload,
            "starting service"
        );
        let argv = service_command(&self.service_program, &self.config);
        run_command(&argv, &self.config)
    }
}
