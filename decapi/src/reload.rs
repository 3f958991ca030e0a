//! Restart the service when its executable is rebuilt (`--reload`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Quiet period after the last change before restarting, so a linker still writing
/// the binary is not exec'd half-written.
const SETTLE: Duration = Duration::from_millis(750);

/// Start watching the running executable in a background task.
pub fn start_exe_watcher() -> Result<()> {
    let exe = std::env::current_exe().context("resolve current executable")?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    tokio::spawn(async move {
        if let Err(e) = run_exe_watcher(exe, args).await {
            warn!("reload watcher failed: {e:#}");
        }
    });
    Ok(())
}

async fn run_exe_watcher(exe: PathBuf, args: Vec<OsString>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(16);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(POLL_INTERVAL),
    )?;
    watcher
        .watch(&exe, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", exe.display()))?;
    info!(exe = %exe.display(), "autoreload enabled");

    while let Some(event) = rx.recv().await {
        if !is_change_of(&event, &exe) {
            continue;
        }
        debug!(kind = ?event.kind, "executable changed");

        // Wait until writes stop.
        loop {
            match tokio::time::timeout(SETTLE, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }

        info!(exe = %exe.display(), "restarting after rebuild");
        return restart(&exe, &args);
    }
    Ok(())
}

/// Whether `event` reports that `exe` was created or modified.
fn is_change_of(event: &NotifyEvent, exe: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| path == exe)
}

#[cfg(unix)]
fn restart(exe: &Path, args: &[OsString]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let err = std::process::Command::new(exe).args(args).exec();
    Err(err).with_context(|| format!("re-exec {}", exe.display()))
}

#[cfg(not(unix))]
fn restart(exe: &Path, args: &[OsString]) -> Result<()> {
    std::process::Command::new(exe)
        .args(args)
        .spawn()
        .with_context(|| format!("respawn {}", exe.display()))?;
    std::process::exit(0);
}
