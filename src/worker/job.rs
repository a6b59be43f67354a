//! A single spawned child process and its observable status.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{JobdError, Result};
use crate::worker::log_file::LogFile;

/// A command to execute, submitted verbatim. No shell interpretation is
/// performed; clients that want one invoke the shell as the program.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
        }
    }
}

/// Snapshot of a job's observable status.
///
/// `exit_code` is meaningful only when `state` is [`JobState::Completed`]:
/// `0` on clean exit, the process exit code on nonzero exit, and `-1` on
/// termination by signal.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub exit_code: i32,
    pub exit_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One spawned child process: unique id, status, owned log file, and the
/// fan-out point for log followers.
///
/// Status mutations are serialized by the internal mutex; the reaper task
/// performs the final transition to `Completed` and then cancels the `done`
/// token exactly once, after the log write handle has been closed.
pub struct Job {
    id: String,
    log_path: PathBuf,
    created_at: DateTime<Utc>,
    status: Mutex<JobStatus>,
    command: Mutex<Option<Command>>,
    write_handle: Mutex<Option<std::fs::File>>,
    pid: OnceLock<i32>,
    done: CancellationToken,
}

impl Job {
    /// Prepare a new job: generate its id, create `<log_dir>/<id>.log`, and
    /// build the child-process descriptor with stdout and stderr redirected
    /// to that file. No process is spawned yet.
    ///
    /// # Errors
    ///
    /// Fails if the log file cannot be created.
    pub fn create(command: CommandSpec, log_dir: &Path) -> Result<Arc<Self>> {
        let id = Uuid::new_v4().to_string();
        let log_path = log_dir.join(format!("{id}.log"));
        let log_file = std::fs::File::create(&log_path)?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file.try_clone()?));

        Ok(Arc::new(Self {
            id,
            log_path,
            created_at: Utc::now(),
            status: Mutex::new(JobStatus {
                state: JobState::Pending,
                exit_code: 0,
                exit_error: None,
                completed_at: None,
            }),
            command: Mutex::new(Some(cmd)),
            write_handle: Mutex::new(Some(log_file)),
            pid: OnceLock::new(),
            done: CancellationToken::new(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Spawn the child process and schedule the reaper.
    ///
    /// On spawn failure the job transitions straight to `Completed` and the
    /// error is returned; the registry entry stays, with no exit
    /// information recorded.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let Some(mut cmd) = self.command.lock().take() else {
            return Err(JobdError::Internal(format!(
                "job {} already started",
                self.id
            )));
        };

        self.status.lock().state = JobState::Running;

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.status.lock().state = JobState::Completed;
                return Err(e.into());
            }
        };

        if let Some(pid) = child.id() {
            let _ = self.pid.set(pid as i32);
        }
        tracing::debug!(job_id = %self.id, pid = ?child.id(), "child process spawned");

        let job = Arc::clone(self);
        tokio::spawn(async move { job.reap(child).await });

        Ok(())
    }

    /// Wait for the child, record its exit disposition, close the job's log
    /// write handle, and signal completion.
    async fn reap(self: Arc<Self>, mut child: Child) {
        let wait_result = child.wait().await;

        {
            let mut status = self.status.lock();
            match wait_result {
                Ok(exit) => {
                    if let Some(code) = exit.code() {
                        status.exit_code = code;
                        if code != 0 {
                            status.exit_error = Some(format!("exit status {code}"));
                        }
                    } else {
                        status.exit_code = -1;
                        status.exit_error = Some(match exit.signal() {
                            Some(sig) => format!("signal: {}", signal_name(sig)),
                            None => String::from("terminated without exit status"),
                        });
                    }
                }
                Err(e) => {
                    status.exit_code = -1;
                    status.exit_error = Some(format!("wait failed: {e}"));
                }
            }
            status.state = JobState::Completed;
            status.completed_at = Some(Utc::now());
        }

        // The write handle must be closed before `done` fires: done implies
        // the log file is no longer written by this process.
        self.write_handle.lock().take();

        self.done.cancel();

        let status = self.status();
        tracing::info!(
            job_id = %self.id,
            exit_code = status.exit_code,
            exit_error = status.exit_error.as_deref().unwrap_or_default(),
            "job completed"
        );
    }

    /// Follow this job's log file from the beginning.
    ///
    /// The returned stop token is the cancel handle: cancelling it ends the
    /// sequence and is idempotent. Job completion also ends the sequence,
    /// since the token is a child of the job's `done` token; cancelling one
    /// follower never affects another.
    pub async fn follow_logs(&self) -> Result<(mpsc::Receiver<String>, CancellationToken)> {
        let stop = self.done.child_token();
        let lines = LogFile::new(&self.log_path).follow(stop.clone()).await?;
        Ok((lines, stop))
    }

    /// Block until the job has been reaped and its log file closed.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Non-blocking snapshot of the job's status.
    pub fn status(&self) -> JobStatus {
        self.status.lock().clone()
    }

    /// Send SIGKILL to the child process.
    ///
    /// Fails once the job has been reaped: the pid may already have been
    /// recycled by the OS, so a completed job is never signalled.
    pub(crate) fn kill(&self) -> Result<()> {
        let pid = self.pid.get().copied().ok_or_else(|| {
            JobdError::Internal(format!("job {} has no spawned process", self.id))
        })?;

        if self.is_done() {
            return Err(JobdError::Internal(format!(
                "job {} has already completed",
                self.id
            )));
        }

        signal::kill(Pid::from_raw(pid), Signal::SIGKILL)?;
        Ok(())
    }
}

/// Conventional name for a termination signal, as reported in `exit_error`.
fn signal_name(signal: i32) -> String {
    match signal {
        1 => "hangup",
        2 => "interrupt",
        3 => "quit",
        6 => "aborted",
        9 => "killed",
        11 => "segmentation fault",
        13 => "broken pipe",
        15 => "terminated",
        other => return format!("signal {other}"),
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(message: &str) -> CommandSpec {
        CommandSpec {
            program: "echo".to_owned(),
            args: vec![message.to_owned()],
        }
    }

    #[tokio::test]
    async fn test_create_is_pending_with_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::create(echo("hello"), dir.path()).unwrap();

        assert!(!job.id().is_empty());
        assert_eq!(job.status().state, JobState::Pending);
        assert!(job.log_path().exists());
        assert!(!job.is_done());
    }

    #[tokio::test]
    async fn test_clean_exit_records_zero() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::create(echo("hello"), dir.path()).unwrap();

        job.start().unwrap();
        job.wait().await;

        let status = job.status();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.exit_code, 0);
        assert!(status.exit_error.is_none());
        assert!(status.completed_at.unwrap() >= job.created_at());
    }

    #[tokio::test]
    async fn test_nonzero_exit_records_code_and_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::create(
            CommandSpec {
                program: "bash".to_owned(),
                args: vec!["-c".to_owned(), "exit 3".to_owned()],
            },
            dir.path(),
        )
        .unwrap();

        job.start().unwrap();
        job.wait().await;

        let status = job.status();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.exit_code, 3);
        assert_eq!(status.exit_error.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn test_spawn_failure_completes_without_exit_info() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::create(
            CommandSpec {
                program: "/no/such/binary".to_owned(),
                args: Vec::new(),
            },
            dir.path(),
        )
        .unwrap();

        let result = job.start();
        assert!(result.is_err());

        let status = job.status();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.exit_code, 0);
        assert!(status.exit_error.is_none());
        // No reaper ran, so done never fires.
        assert!(!job.is_done());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::create(echo("hello"), dir.path()).unwrap();

        job.start().unwrap();
        assert!(job.start().is_err());
        job.wait().await;
    }
}
