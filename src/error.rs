use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobdError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("{subject} not permitted to {action} on {object}")]
    PermissionDenied {
        subject: String,
        object: String,
        action: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to signal process: {0}")]
    Kill(#[from] nix::errno::Errno),

    #[error("Authorization backend error: {0}")]
    Auth(#[from] casbin::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobdError>;
