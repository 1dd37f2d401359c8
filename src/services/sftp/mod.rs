// SFTP 后端服务

mod access;
mod connector;
mod service;

pub use access::{worker_runtime, FileAccessService, PendingResult};
pub use connector::SshConnector;
pub use service::{read_to_end_chunked, SftpService};
