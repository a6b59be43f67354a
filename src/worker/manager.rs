//! Process-wide job registry.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{JobdError, Result};
use crate::worker::job::{CommandSpec, Job, JobState, JobStatus};

/// Registry of all jobs started by this process, keyed by job id.
///
/// Each key is written exactly once, at job creation, and entries are never
/// removed for the life of the process: completed jobs stay queryable and
/// followable.
pub struct JobManager {
    jobs: DashMap<String, Arc<Job>>,
    log_dir: PathBuf,
}

impl JobManager {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs: DashMap::new(),
            log_dir: log_dir.into(),
        }
    }

    /// Create a job, register it, and start it.
    ///
    /// Never blocks on the child. If the spawn fails the registry entry
    /// stays, in `Completed` state with no exit information, and the error
    /// is returned.
    pub fn start_job(&self, command: CommandSpec) -> Result<Arc<Job>> {
        tracing::info!(program = %command.program, "starting job");

        let job = Job::create(command, &self.log_dir)?;
        self.jobs.insert(job.id().to_owned(), Arc::clone(&job));

        job.start()?;
        Ok(job)
    }

    /// Kill a job and wait until it has been reaped, so a subsequent query
    /// observes `Completed`.
    pub async fn stop_job(&self, job_id: &str) -> Result<()> {
        let job = self.get(job_id)?;
        job.kill()?;
        job.wait().await;
        Ok(())
    }

    /// Snapshot of a job's status. Never blocks.
    pub fn query_job(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.get(job_id)?.status())
    }

    /// Number of jobs currently in the `Running` state.
    pub fn running_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.value().status().state == JobState::Running)
            .count()
    }

    /// Follow a job's logs from the beginning. See [`Job::follow_logs`].
    pub async fn follow_logs(
        &self,
        job_id: &str,
    ) -> Result<(mpsc::Receiver<String>, CancellationToken)> {
        self.get(job_id)?.follow_logs().await
    }

    fn get(&self, job_id: &str) -> Result<Arc<Job>> {
        self.jobs
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| JobdError::JobNotFound(job_id.to_owned()))
    }
}
