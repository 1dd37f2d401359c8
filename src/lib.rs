// sftp-access - 基于连接池与 TOFU 主机密钥校验的 SFTP 文件访问

pub mod constants;
pub mod models;
pub mod services;
pub mod ssh;

pub use models::{ClientSettings, FileEntry, FileType};
pub use services::{FileAccessService, HostTrustStore, KeyIdentity, PendingResult, SshConnector};
pub use ssh::{ConnectionPool, HostKeyDecider, HostKeyVerdict, RetryPolicy, SshError};
