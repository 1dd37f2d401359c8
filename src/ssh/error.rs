// SSH / SFTP 错误类型定义

use russh_sftp::protocol::StatusCode;
use thiserror::Error;

use super::event::HostKeyVerdict;

/// SSH 错误类型
///
/// 分为三类：
/// - 传输类（Io/Auth/Transport/Timeout/Channel/Disconnected）：可重试
/// - 协议类（Remote）：远端明确拒绝，重试无意义
/// - 其余（身份、主机密钥、本地存储等）：立即返回
#[derive(Debug, Error)]
pub enum SshError {
    /// 尚未生成密钥对
    #[error("No SSH key generated, generate one first")]
    NoIdentity,

    /// 主机密钥未被信任（新主机或密钥变化被拒绝）
    #[error("Host key for {host}:{port} rejected ({verdict}): {fingerprint}")]
    HostKeyRejected {
        host: String,
        port: u16,
        fingerprint: String,
        verdict: HostKeyVerdict,
    },

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// SSH 传输层错误
    #[error("SSH transport error: {0}")]
    Transport(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 会话已断开
    #[error("Session disconnected: {0}")]
    Disconnected(String),

    /// 远端拒绝了文件操作（路径不存在、权限不足等）
    #[error("SFTP {op} '{path}' failed: {message}")]
    Remote {
        op: &'static str,
        path: String,
        message: String,
    },

    /// 多次重试后仍失败
    #[error("SFTP {op} '{path}' failed after {attempts} attempts: {source}")]
    ExhaustedRetries {
        op: &'static str,
        path: String,
        attempts: u32,
        #[source]
        source: Box<SshError>,
    },

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 本地持久化错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 操作已取消
    #[error("Operation cancelled")]
    Cancelled,
}

impl SshError {
    /// 是否属于传输类错误（值得丢弃连接后重试）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SshError::Io(_)
                | SshError::Auth(_)
                | SshError::Transport(_)
                | SshError::Timeout(_)
                | SshError::Channel(_)
                | SshError::Disconnected(_)
        )
    }

    /// 将 russh-sftp 客户端错误归类
    pub fn from_sftp(
        op: &'static str,
        path: &str,
        e: russh_sftp::client::error::Error,
    ) -> Self {
        use russh_sftp::client::error::Error as SftpError;

        match e {
            SftpError::Status(status) => match status.status_code {
                StatusCode::NoConnection | StatusCode::ConnectionLost => {
                    SshError::Disconnected(format!("SFTP {} '{}': {}", op, path, status.error_message))
                }
                StatusCode::BadMessage => {
                    SshError::Channel(format!("SFTP {} '{}': {}", op, path, status.error_message))
                }
                _ => SshError::Remote {
                    op,
                    path: path.to_string(),
                    message: status.error_message,
                },
            },
            SftpError::Timeout => SshError::Channel(format!("SFTP {} '{}' timed out", op, path)),
            SftpError::IO(msg) => SshError::Channel(format!("SFTP {} '{}': {}", op, path, msg)),
            SftpError::Limited(msg) => {
                SshError::Channel(format!("SFTP {} '{}': {}", op, path, msg))
            }
            SftpError::UnexpectedPacket => {
                SshError::Channel(format!("SFTP {} '{}': unexpected packet", op, path))
            }
            SftpError::UnexpectedBehavior(msg) => {
                SshError::Channel(format!("SFTP {} '{}': {}", op, path, msg))
            }
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Transport(e.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
