use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::{Server, ServerTlsConfig};

use crate::error::Result;
use crate::grpc::job_service::JobService;
use crate::proto::job_runner_server::JobRunnerServer;

pub struct GrpcServer {
    addr: SocketAddr,
    service: JobService,
    tls: ServerTlsConfig,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, service: JobService, tls: ServerTlsConfig) -> Self {
        Self { addr, service, tls }
    }

    /// Serve until the shutdown token is cancelled.
    ///
    /// All connections are mutually authenticated: clients without a
    /// certificate signed by the configured CA fail the handshake.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(addr = %self.addr, "starting gRPC server");

        Server::builder()
            .tls_config(self.tls)?
            .add_service(JobRunnerServer::new(self.service))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await?;

        Ok(())
    }
}
