use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::worker::JobManager;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is
/// received; the gRPC server drains in-flight requests on cancellation.
/// Child processes are never killed on shutdown, so any jobs still running
/// are logged before the token fires — their children keep writing to log
/// files nothing will read again.
pub fn install_shutdown_handler(manager: Arc<JobManager>) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };

        let running = manager.running_jobs();
        if running > 0 {
            tracing::warn!(
                signal = received,
                running_jobs = running,
                "shutting down; running jobs are abandoned, their children keep going"
            );
        } else {
            tracing::info!(signal = received, "shutting down");
        }

        token_clone.cancel();
    });

    token
}
