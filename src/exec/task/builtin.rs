// src/exec/task/builtin.rs

//! Tasks available in every registry.
//!
//! - `log <words...>`: logs its arguments at info, status 0.
//! - `digest <file>`: writes the BLAKE3 digest of `<file>` to `<file>.b3`
//!   in `b3sum` format; status 2 when the file cannot be read or the sidecar
//!   cannot be written.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::exec::task::registry::{InProcessTask, TaskFuture, TaskSettings};
use crate::fs::FileSystem;

pub const LOG_TASK: &str = "log";
pub const DIGEST_TASK: &str = "digest";

/// Status of a task that could not do its job.
pub const STATUS_ERROR: i32 = 2;

#[derive(Debug)]
pub struct LogTask {
    settings: TaskSettings,
}

impl LogTask {
    pub fn new(settings: TaskSettings) -> Self {
        Self { settings }
    }
}

impl InProcessTask for LogTask {
    fn run(self: Box<Self>, _cancel: CancellationToken) -> TaskFuture {
        Box::pin(async move {
            info!(
                task = %self.settings.task_name,
                message = %self.settings.args.join(" "),
                "log task"
            );
            0
        })
    }
}

#[derive(Debug)]
pub struct DigestTask {
    settings: TaskSettings,
    fs: Arc<dyn FileSystem>,
}

impl DigestTask {
    pub fn new(settings: TaskSettings, fs: Arc<dyn FileSystem>) -> Self {
        Self { settings, fs }
    }
}

impl InProcessTask for DigestTask {
    fn run(self: Box<Self>, cancel: CancellationToken) -> TaskFuture {
        Box::pin(async move {
            let Some(file) = self.settings.args.first().map(PathBuf::from) else {
                error!(task = %self.settings.task_name, "digest task needs a file argument");
                return STATUS_ERROR;
            };

            let fs = Arc::clone(&self.fs);
            let target = file.clone();
            let work = tokio::task::spawn_blocking(move || write_digest(fs.as_ref(), &target));

            let res = tokio::select! {
                res = work => res,
                _ = cancel.cancelled() => {
                    debug!(file = %file.display(), "digest task cancelled");
                    return STATUS_ERROR;
                }
            };

            match res {
                Ok(Ok(hex)) => {
                    info!(file = %file.display(), digest = %hex, "digest written");
                    0
                }
                Ok(Err(e)) => {
                    error!(file = %file.display(), error = %e, "digest task failed");
                    STATUS_ERROR
                }
                Err(e) => {
                    error!(file = %file.display(), error = %e, "digest worker failed");
                    STATUS_ERROR
                }
            }
        })
    }
}

/// Sidecar path holding the digest of `file`.
pub fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".b3");
    PathBuf::from(name)
}

fn write_digest(fs: &dyn FileSystem, file: &Path) -> Result<String> {
    let mut reader = fs.open_read(file)?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).with_context(|| format!("reading {:?}", file)),
        };
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let hex = hasher.finalize().to_hex().to_string();
    let line = format!("{hex}  {}\n", file.display());
    fs.write(&sidecar_path(file), line.as_bytes())?;
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::time::Duration;

    fn settings(args: &[&str]) -> TaskSettings {
        TaskSettings {
            wait_for_completion: true,
            remote_delegation: false,
            delay: Duration::ZERO,
            task_name: DIGEST_TASK.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn sidecar_appends_extension() {
        assert_eq!(sidecar_path(Path::new("/data/f.bin")), PathBuf::from("/data/f.bin.b3"));
    }

    #[tokio::test]
    async fn digest_writes_sidecar() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/f.bin", "hello");
        let task = Box::new(DigestTask::new(settings(&["/data/f.bin"]), Arc::new(fs.clone())));

        assert_eq!(task.run(CancellationToken::new()).await, 0);

        let expected = blake3::hash(b"hello").to_hex().to_string();
        let sidecar = String::from_utf8(fs.contents("/data/f.bin.b3").unwrap()).unwrap();
        assert_eq!(sidecar, format!("{expected}  /data/f.bin\n"));
    }

    #[tokio::test]
    async fn digest_of_missing_file_is_an_error_status() {
        let fs = MockFileSystem::new();
        let task = Box::new(DigestTask::new(settings(&["/data/missing"]), Arc::new(fs)));
        assert_eq!(task.run(CancellationToken::new()).await, STATUS_ERROR);

        let task = Box::new(DigestTask::new(settings(&[]), Arc::new(MockFileSystem::new())));
        assert_eq!(task.run(CancellationToken::new()).await, STATUS_ERROR);
    }
}
