use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobd::auth::Authorizer;
use jobd::config::Config;
use jobd::grpc::{GrpcServer, JobService};
use jobd::shutdown::install_shutdown_handler;
use jobd::tls::TlsIdentity;
use jobd::worker::JobManager;

#[derive(Parser, Debug)]
#[command(name = "jobd")]
#[command(about = "A remote job execution service over mutually-authenticated gRPC")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    std::fs::create_dir_all(&config.log_dir)?;

    let tls = TlsIdentity::load(&config.tls).await?;
    let authorizer = Arc::new(Authorizer::new(&config.acl.model_file, &config.acl.policy_file).await?);
    let manager = Arc::new(JobManager::new(&config.log_dir));

    let shutdown = install_shutdown_handler(Arc::clone(&manager));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = GrpcServer::new(
        addr,
        JobService::new(manager, authorizer),
        tls.server_tls_config(),
    );

    tracing::info!(
        addr = %addr,
        log_dir = %config.log_dir.display(),
        "jobd listening"
    );
    server.run(shutdown).await?;

    Ok(())
}
