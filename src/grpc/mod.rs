pub mod job_service;
pub mod server;

pub use job_service::JobService;
pub use server::GrpcServer;
