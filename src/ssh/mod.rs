// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, KeepaliveConfig)
// - error: 错误类型 (SshError)
// - event: 主机密钥确认 (HostKeyVerdict, HostKeyDecider)
// - handler: russh Handler 实现，握手时校验主机密钥
// - client: SSH 客户端核心
// - session: SSH 会话 (SshSession)
// - channel: 文件通道抽象 (RemoteFs, SftpConnector)
// - pool: 连接池 (ConnectionPool)
// - reconnect: 失败重试策略 (RetryPolicy)

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod pool;
pub mod reconnect;
pub mod session;

// 公开导出
pub use channel::{RemoteFs, SftpChannel, SftpConnector};
pub use client::SshClient;
pub use config::{KeepaliveConfig, SshConfig};
pub use error::SshError;
pub use event::{
    ChannelDecider, HostKeyAction, HostKeyDecider, HostKeyPrompt, HostKeyRequest, HostKeyVerdict,
    RejectUnknown,
};
pub use pool::{ConnectionPool, PoolKey};
pub use reconnect::RetryPolicy;
pub use session::SshSession;
