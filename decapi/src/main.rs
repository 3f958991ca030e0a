//! Decompile service - uploads a binary, runs the external decompiler, returns its output.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use decapi::reload;
use decapi::routes;
use decapi::state::{AppState, DEFAULT_DECOMPILER, DEFAULT_MAX_UPLOAD_BYTES, ServiceConfig};

#[derive(Parser)]
#[command(name = "decapi", version)]
#[command(about = "HTTP service wrapping an external binary decompiler")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Restart automatically when the service executable changes
    #[arg(long)]
    reload: bool,

    /// Decompiler executable, invoked as `<decompiler> <file>`
    #[arg(long, env = "DECOMPILER", default_value = DEFAULT_DECOMPILER)]
    decompiler: OsString,

    /// Directory for staged uploads (defaults to the system temp dir)
    #[arg(long, env = "DECAPI_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Reject request bodies larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Kill the decompiler after this many seconds (default: wait forever)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        let defaults = ServiceConfig::default();
        ServiceConfig {
            decompiler: self.decompiler.clone(),
            temp_dir: self.temp_dir.clone().unwrap_or(defaults.temp_dir),
            max_upload_bytes: self.max_upload_bytes,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    decapi::logging::init("decapi=info,tower_http=info");

    let args = Args::parse();
    let config = args.service_config();
    info!(
        decompiler = %config.decompiler.to_string_lossy(),
        temp_dir = %config.temp_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        timeout_secs = ?args.timeout_secs,
        "starting decapi"
    );

    if args.reload {
        reload::start_exe_watcher()?;
    }

    let app = routes::router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(err = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(err = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_launcher_expectations() {
        let args = Args::parse_from(["decapi"]);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 8000);
        assert!(!args.reload);
        assert_eq!(args.service_config().timeout, None);
    }

    #[test]
    fn parses_launcher_command_line() {
        let args = Args::parse_from([
            "decapi", "--host", "127.0.0.1", "--port", "9999", "--reload",
        ]);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 9999);
        assert!(args.reload);
    }

    #[test]
    fn timeout_flag_becomes_duration() {
        let args = Args::parse_from([
            "decapi",
            "--timeout-secs",
            "30",
            "--temp-dir",
            "/scratch",
        ]);
        let config = args.service_config();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.temp_dir, PathBuf::from("/scratch"));
    }
}
