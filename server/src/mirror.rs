use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::SecondsFormat;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::MirrorConfig;
use crate::domain::{MirrorOutcome, StoredVideo, VersionControl};

/// One step of the mirror sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PullRebase,
    Add,
    Commit,
    Push,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::PullRebase => "pull --rebase",
            Step::Add => "add",
            Step::Commit => "commit",
            Step::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{step} could not be started: {source}")]
    Spawn {
        step: Step,
        #[source]
        source: io::Error,
    },

    #[error("{step} exited with {code}: {stderr}")]
    Failed {
        step: Step,
        code: String,
        stderr: String,
    },

    #[error("{step} timed out after {timeout:?}")]
    TimedOut { step: Step, timeout: Duration },
}

impl MirrorError {
    #[must_use]
    pub fn step(&self) -> Step {
        match self {
            MirrorError::Spawn { step, .. }
            | MirrorError::Failed { step, .. }
            | MirrorError::TimedOut { step, .. } => *step,
        }
    }
}

/// Pushes freshly stored videos into a version controlled mirror.
///
/// Every call makes exactly one attempt. A failing step stops the sequence and
/// is reported in the outcome; the stored file is never touched.
pub struct RepositoryMirror {
    vcs: Arc<dyn VersionControl>,
    remote: String,
    branch: String,
    lock: Option<Mutex<()>>,
}

impl RepositoryMirror {
    #[must_use]
    pub fn new(vcs: Arc<dyn VersionControl>, config: &MirrorConfig) -> Self {
        Self {
            vcs,
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            lock: config.serialize.then(|| Mutex::new(())),
        }
    }

    /// Mirror backed by the `git` command line client.
    #[must_use]
    pub fn git(config: &MirrorConfig) -> Self {
        Self::new(Arc::new(GitCli::new(config)), config)
    }

    pub async fn sync(&self, video: &StoredVideo) -> MirrorOutcome {
        // Only narrows races between uploads of this process. Other pushers can still win.
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let start = Instant::now();
        match self.run(video).await {
            Ok(()) => {
                tracing::info!(
                    "file: {} mirrored to {}/{} in {:?}",
                    video.stored_filename,
                    self.remote,
                    self.branch,
                    start.elapsed()
                );
                MirrorOutcome::pushed()
            }
            Err(e) => {
                tracing::warn!(
                    "file: {} not mirrored, step '{}' failed. Error: {}",
                    video.stored_filename,
                    e.step(),
                    e
                );
                MirrorOutcome::failed(e.to_string())
            }
        }
    }

    /// Runs [`sync`](Self::sync) on its own task. Dropping the returned future,
    /// as happens when the uploading client disconnects, leaves the sequence
    /// running to completion so no git command is killed halfway.
    pub async fn sync_detached(self: Arc<Self>, video: StoredVideo) -> MirrorOutcome {
        let task = tokio::spawn(async move { self.sync(&video).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("mirror task failed. Error: {e}");
                MirrorOutcome::failed(e.to_string())
            }
        }
    }

    async fn run(&self, video: &StoredVideo) -> Result<(), MirrorError> {
        self.vcs.pull_rebase(&self.remote, &self.branch).await?;
        self.vcs.add(&video.storage_path).await?;
        self.vcs.commit(&commit_message(video)).await?;
        self.vcs.push(&self.remote, &self.branch).await
    }
}

#[must_use]
pub fn commit_message(video: &StoredVideo) -> String {
    format!(
        "Add video {} (original: {}) at {}",
        video.stored_filename,
        video.original_filename,
        video
            .uploaded_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Runs `git` (or a configured stand-in) inside the mirror working copy.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    #[must_use]
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            program: config.program.clone(),
            workdir: config.workdir.clone(),
            timeout: config.command_timeout,
        }
    }

    async fn run(&self, step: Step, args: &[&OsStr]) -> Result<(), MirrorError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            // only the timeout below drops this future
            .kill_on_drop(true);

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output.map_err(|source| MirrorError::Spawn { step, source })?,
            Err(_) => {
                return Err(MirrorError::TimedOut {
                    step,
                    timeout: self.timeout,
                })
            }
        };

        if output.status.success() {
            tracing::debug!("git {} finished in {:?}", step, start.elapsed());
            Ok(())
        } else {
            Err(MirrorError::Failed {
                step,
                code: output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(), MirrorError> {
        let args = [
            OsStr::new("pull"),
            OsStr::new("--rebase"),
            OsStr::new(remote),
            OsStr::new(branch),
        ];
        self.run(Step::PullRebase, &args).await
    }

    async fn add(&self, path: &Path) -> Result<(), MirrorError> {
        let args = [OsStr::new("add"), OsStr::new("--"), path.as_os_str()];
        self.run(Step::Add, &args).await
    }

    async fn commit(&self, message: &str) -> Result<(), MirrorError> {
        let args = [OsStr::new("commit"), OsStr::new("-m"), OsStr::new(message)];
        self.run(Step::Commit, &args).await
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<(), MirrorError> {
        let refspec = format!("HEAD:{branch}");
        let args = [
            OsStr::new("push"),
            OsStr::new(remote),
            OsStr::new(refspec.as_str()),
        ];
        self.run(Step::Push, &args).await
    }
}
