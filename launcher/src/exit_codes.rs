//! Stable exit codes for the launcher.
//!
//! A launched child's own exit code is passed through unchanged; these cover
//! the launcher's own outcomes.

/// Launch succeeded (or the launched command exited 0).
pub const OK: i32 = 0;
/// Invalid configuration, unwritable state files, or a command that failed to spawn.
pub const INVALID: i32 = 1;
/// Added to the signal number when a child is killed by a signal.
pub const SIGNAL_BASE: i32 = 128;
