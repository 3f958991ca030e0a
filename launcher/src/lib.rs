//! Container entrypoint for the decompile service.
//!
//! Resolves the launch configuration from the environment, records it in the
//! shell profile and a JSON snapshot, then either starts the service or runs
//! the given command with the configuration in its environment.

pub mod config;
pub mod entry;
pub mod exit_codes;
pub mod logging;
pub mod process;
pub mod snapshot;
