//! Worker subsystem for running and observing jobs.
//!
//! This module owns the full lifecycle of remotely submitted commands:
//! - **Job lifecycle**: Spawns child processes with output redirected to a
//!   per-job log file, reaps them, and records their exit disposition
//! - **Registry**: Process-wide lookup of jobs by id
//! - **Log following**: Turns a growing log file into a live line stream
//!
//! # Components
//!
//! - [`JobManager`]: Registry and entry point (start/stop/query/follow)
//! - [`Job`]: One spawned child process and its status
//! - [`LogFile`]: Catch-up plus live tailing of a job's log file
//!
//! # Execution Flow
//!
//! 1. [`JobManager::start_job`] creates a [`Job`] and inserts it into the
//!    registry
//! 2. [`Job::start`] spawns the child with stdout and stderr redirected to
//!    `<log_dir>/<job_id>.log` and schedules the reaper
//! 3. The reaper waits for the child, captures the exit code (or `-1` on
//!    signal termination), closes the log write handle, and signals
//!    completion
//! 4. Followers tail the log file through [`LogFile::follow`]; job
//!    completion ends every follower's stream
//!
//! # Security Note
//!
//! Commands are executed directly on the host without sandboxing or
//! resource limits. Callers are authenticated and authorized at the RPC
//! boundary.

pub mod job;
pub mod log_file;
pub mod manager;

pub use job::{CommandSpec, Job, JobState, JobStatus};
pub use log_file::LogFile;
pub use manager::JobManager;
