//! Scoped staging of uploaded binaries and the decompiler subprocess.
//!
//! Every upload is written into its own [`tempfile`] entry. The entry is owned
//! by a [`StagedUpload`] (while writing) and then a [`StagedFile`] (while the
//! decompiler reads it); dropping either removes the file, so every exit path
//! of a request releases it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

const TEMP_PREFIX: &str = "decapi-";

/// An upload being written to its temporary file.
pub struct StagedUpload {
    file: tokio::fs::File,
    path: TempPath,
    written: u64,
}

impl StagedUpload {
    /// Create a fresh, uniquely named temporary file inside `dir`.
    pub async fn create(dir: &Path) -> Result<Self> {
        let dir = dir.to_path_buf();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(&dir)
                .with_context(|| format!("create temp file in {}", dir.display()))
        })
        .await
        .context("join temp file creation")??;

        let (file, path) = named.into_parts();
        debug!(path = %path.display(), "staged upload created");
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
            written: 0,
        })
    }

    /// Append a chunk of the upload.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("write upload to {}", self.path.display()))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush all pending writes and close the handle so the decompiler sees the whole file.
    pub async fn finish(mut self) -> Result<StagedFile> {
        self.file
            .flush()
            .await
            .with_context(|| format!("flush upload {}", self.path.display()))?;
        self.file
            .sync_all()
            .await
            .with_context(|| format!("sync upload {}", self.path.display()))?;
        drop(self.file);
        Ok(StagedFile {
            path: self.path,
            size: self.written,
        })
    }
}

/// A fully written upload, removed from disk when dropped or [`StagedFile::remove`]d.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the file now, reporting failures instead of swallowing them in `Drop`.
    pub async fn remove(self) -> Result<()> {
        let display = self.path.display().to_string();
        tokio::task::spawn_blocking(move || self.path.close())
            .await
            .context("join temp file removal")?
            .with_context(|| format!("remove {display}"))
    }
}

/// Captured decompiler output.
#[derive(Debug)]
pub struct DecompileOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run `program <input>` and capture both output streams in full.
///
/// The exit status is recorded but never interpreted. Output is drained concurrently with
/// the wait so a chatty decompiler cannot fill a pipe and stall. With `timeout` set, the
/// child is killed once it elapses; the readers then get [`DRAIN_GRACE`] to collect what
/// is left in the pipes and are stopped, so processes the decompiler spawned itself
/// cannot hold the request open. Output read up to that point is returned with
/// `timed_out` set.
#[instrument(skip_all, fields(input = %input.display(), timeout_ms = timeout.map(|t| t.as_millis() as u64)))]
pub async fn run_decompiler(
    program: &OsStr,
    input: &Path,
    timeout: Option<Duration>,
) -> Result<DecompileOutput> {
    let mut cmd = Command::new(program);
    cmd.arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program.to_string_lossy(), "spawning decompiler");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = %program.to_string_lossy(), "failed to spawn decompiler");
            return Err(e).with_context(|| format!("spawn {}", program.to_string_lossy()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stdout_task = ReaderTask::spawn(stdout, stop_rx.clone());
    let stderr_task = ReaderTask::spawn(stderr, stop_rx);

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().await.context("wait for decompiler")?,
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.context("wait for decompiler")?,
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "decompiler timed out, killing"
                );
                timed_out = true;
                child.kill().await.context("kill decompiler")?;
                let status = child.wait().await.context("wait decompiler after kill")?;
                tokio::time::sleep(DRAIN_GRACE).await;
                let _ = stop_tx.send(true);
                status
            }
        },
    };

    let stdout = stdout_task.join().await.context("join stdout reader")?;
    let stderr = stderr_task.join().await.context("join stderr reader")?;
    drop(stop_tx);

    debug!(
        exit_code = ?status.code(),
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        timed_out,
        "decompiler finished"
    );
    Ok(DecompileOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// How long readers keep draining after a timed-out decompiler is killed.
pub const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Pipe reader that is aborted when dropped, so an abandoned request does not leave
/// it waiting on a pipe some grandchild still holds.
struct ReaderTask(JoinHandle<Result<Vec<u8>>>);

impl ReaderTask {
    fn spawn<R>(reader: R, stop: watch::Receiver<bool>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self(tokio::spawn(read_stream(reader, stop)))
    }

    async fn join(mut self) -> Result<Vec<u8>> {
        (&mut self.0).await.context("reader task panicked")?
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Read `reader` to EOF, or until `stop` flips to true.
async fn read_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    mut stop: watch::Receiver<bool>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = read.context("read output")?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            _ = stop.wait_for(|stopped| *stopped) => {
                debug!(bytes = buf.len(), "reader stopped before EOF");
                break;
            }
        }
    }

    Ok(buf)
}

/// How captured byte streams are rendered into the JSON response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    /// UTF-8, invalid sequences replaced with U+FFFD.
    #[default]
    Text,
    /// Standard base64 with padding.
    Base64,
}

impl OutputEncoding {
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            OutputEncoding::Text => String::from_utf8_lossy(bytes).into_owned(),
            OutputEncoding::Base64 => STANDARD.encode(bytes),
        }
    }
}

/// Body of a completed `POST /decompile/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileResponse {
    pub stdout: String,
    pub stderr: String,
}

impl DecompileResponse {
    pub fn encode(output: &DecompileOutput, encoding: OutputEncoding) -> Self {
        Self {
            stdout: encoding.encode(&output.stdout),
            stderr: encoding.encode(&output.stderr),
        }
    }
}

/// Resolve the directory uploads are staged into.
pub fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_encoding_replaces_invalid_utf8() {
        assert_eq!(OutputEncoding::Text.encode(b"\xffOUT"), "\u{FFFD}OUT");
    }

    #[test]
    fn base64_encoding_keeps_raw_bytes() {
        assert_eq!(OutputEncoding::Base64.encode(b"\xffOUT"), "/09VVA==");
    }

    #[test]
    fn encoding_parses_lowercase_names() {
        let enc: OutputEncoding = serde_json::from_str("\"base64\"").expect("parse");
        assert_eq!(enc, OutputEncoding::Base64);
        assert_eq!(OutputEncoding::default(), OutputEncoding::Text);
    }

    #[tokio::test]
    async fn staged_upload_is_removed_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut upload = StagedUpload::create(temp.path()).await.expect("create");
        upload.write_chunk(b"MZ\x90\x00").await.expect("write");
        let staged = upload.finish().await.expect("finish");
        let path = staged.path().to_path_buf();

        assert_eq!(std::fs::read(&path).expect("read"), b"MZ\x90\x00");
        assert_eq!(staged.size(), 4);
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staged_file_remove_deletes_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let upload = StagedUpload::create(temp.path()).await.expect("create");
        let staged = upload.finish().await.expect("finish");
        let path = staged.path().to_path_buf();
        staged.remove().await.expect("remove");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_decompiler(
            OsStr::new("decapi-test-no-such-decompiler"),
            temp.path(),
            None,
        )
        .await
        .expect_err("spawn should fail");
        assert!(format!("{err:#}").contains("spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_run_keeps_partial_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("fork.sh");
        std::fs::write(&script, "printf early\nprintf late >&2\nsleep 6\n").expect("write");

        let started = std::time::Instant::now();
        let output = run_decompiler(OsStr::new("sh"), &script, Some(Duration::from_millis(300)))
            .await
            .expect("run");

        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(output.stdout, b"early");
        assert_eq!(output.stderr, b"late");
    }
}
