//! Shared application state for the decompile service.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::decompile::default_temp_dir;

/// Default decompiler executable, resolved through `PATH`.
pub const DEFAULT_DECOMPILER: &str = "ilspycmd";

/// Default request body limit (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Settings fixed at startup and read by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Program invoked as `<decompiler> <staged-file>`.
    pub decompiler: OsString,
    /// Directory uploads are staged into.
    pub temp_dir: PathBuf,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Kill the decompiler after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            decompiler: OsString::from(DEFAULT_DECOMPILER),
            temp_dir: default_temp_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            timeout: None,
        }
    }
}

/// Shared state accessible from all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}
