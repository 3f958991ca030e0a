//! `entrypoint [args...]` - start the decompile service or run a command.

use anyhow::Result;

use launcher::config::LaunchConfig;
use launcher::entry::{Invocation, Launcher};
use launcher::exit_codes;
use launcher::logging;
use launcher::process::service_program;
use launcher::snapshot::SnapshotPaths;

fn main() {
    logging::init("launcher=info");
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let lookup = |name: &str| std::env::var(name).ok();

    let config = LaunchConfig::from_env()?;
    let paths = SnapshotPaths::resolve(lookup)?;
    let launcher_exe = std::env::current_exe().ok();
    let launcher = Launcher {
        config,
        paths,
        service_program: service_program(lookup, launcher_exe.as_deref()),
    };
    launcher.run(Invocation::from_args(&args))
}
