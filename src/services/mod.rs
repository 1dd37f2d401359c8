// 服务层
//
// - identity: 本机 SSH 身份密钥
// - known_hosts: 主机密钥信任存储
// - sftp: 远程文件访问
// - storage: 配置目录与持久化

pub mod identity;
pub mod known_hosts;
pub mod sftp;
pub mod storage;

pub use identity::KeyIdentity;
pub use known_hosts::{fingerprint, host_id, HostTrustStore};
pub use sftp::{FileAccessService, PendingResult, SshConnector};
