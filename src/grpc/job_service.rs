use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::auth::{self, Authorizer};
use crate::error::JobdError;
use crate::proto::job_runner_server::JobRunner;
use crate::proto::{
    FollowLogsRequest, FollowLogsResponse, JobStatus as ProtoJobStatus, QueryRequest,
    QueryResponse, StartRequest, StartResponse, State as ProtoState, StopRequest, StopResponse,
};
use crate::worker::{CommandSpec, JobManager, JobState};

/// Log lines buffered per follower between the worker and the wire.
const STREAM_BUFFER: usize = 64;

/// gRPC service translating the job execution API into manager calls.
///
/// Every operation authorizes the caller first: the subject is the
/// CommonName of the verified client certificate, the object is always the
/// wildcard, and the action depends on the operation.
pub struct JobService {
    manager: Arc<JobManager>,
    authorizer: Arc<Authorizer>,
}

impl JobService {
    pub fn new(manager: Arc<JobManager>, authorizer: Arc<Authorizer>) -> Self {
        Self {
            manager,
            authorizer,
        }
    }

    fn authorize<T>(&self, request: &Request<T>, action: &str) -> Result<(), Status> {
        let subject = auth::subject_common_name(request)?;
        self.authorizer
            .authorize(&subject, auth::OBJECT_WILDCARD, action)
            .map_err(handle_error)
    }
}

#[tonic::async_trait]
impl JobRunner for JobService {
    async fn start(
        &self,
        request: Request<StartRequest>,
    ) -> Result<Response<StartResponse>, Status> {
        self.authorize(&request, auth::ACTION_CREATE)?;

        let req = request.into_inner();
        let command = req
            .command
            .ok_or_else(|| Status::invalid_argument("Command is required"))?;
        if command.program.trim().is_empty() {
            return Err(Status::invalid_argument("Command program cannot be empty"));
        }

        let job = self
            .manager
            .start_job(CommandSpec {
                program: command.program,
                args: command.args,
            })
            .map_err(handle_error)?;

        tracing::info!(job_id = %job.id(), "job started");
        Ok(Response::new(StartResponse {
            job_id: job.id().to_owned(),
        }))
    }

    async fn stop(&self, request: Request<StopRequest>) -> Result<Response<StopResponse>, Status> {
        self.authorize(&request, auth::ACTION_DELETE)?;

        let req = request.into_inner();
        self.manager
            .stop_job(&req.job_id)
            .await
            .map_err(handle_error)?;

        tracing::info!(job_id = %req.job_id, "job stopped");
        Ok(Response::new(StopResponse {}))
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        self.authorize(&request, auth::ACTION_READ)?;

        let req = request.into_inner();
        let status = self.manager.query_job(&req.job_id).map_err(handle_error)?;

        Ok(Response::new(QueryResponse {
            job_status: Some(ProtoJobStatus {
                job_id: req.job_id,
                state: state_to_proto(status.state) as i32,
                exit_code: i64::from(status.exit_code),
            }),
        }))
    }

    type FollowLogsStream = ReceiverStream<Result<FollowLogsResponse, Status>>;

    async fn follow_logs(
        &self,
        request: Request<FollowLogsRequest>,
    ) -> Result<Response<Self::FollowLogsStream>, Status> {
        self.authorize(&request, auth::ACTION_READ)?;

        let req = request.into_inner();
        let (mut lines, cancel) = self
            .manager
            .follow_logs(&req.job_id)
            .await
            .map_err(handle_error)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Caller hung up: release the follower's handle and watch.
                    _ = tx.closed() => {
                        cancel.cancel();
                        return;
                    }
                    line = lines.recv() => match line {
                        Some(log) => {
                            if tx.send(Ok(FollowLogsResponse { log })).await.is_err() {
                                cancel.cancel();
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

fn state_to_proto(state: JobState) -> ProtoState {
    match state {
        // Pending is internal; the wire only distinguishes running from
        // completed.
        JobState::Pending => ProtoState::Unspecified,
        JobState::Running => ProtoState::Running,
        JobState::Completed => ProtoState::Completed,
    }
}

/// Map a worker error onto the wire: not-found and permission-denied pass
/// through, everything else is logged and returned opaque.
fn handle_error(err: JobdError) -> Status {
    match err {
        JobdError::JobNotFound(_) => Status::not_found("Job not found"),
        JobdError::PermissionDenied { .. } => Status::permission_denied(err.to_string()),
        other => {
            tracing::error!(error = %other, "unexpected error occurred");
            Status::internal("Internal server error")
        }
    }
}
