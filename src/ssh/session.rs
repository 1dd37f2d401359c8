// SSH 会话管理
// 连接成功后的会话对象，负责打开 SFTP 子系统

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use russh::client::Handle;
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use tokio::time::timeout;
use tracing::debug;

use super::error::SshError;
use super::handler::SshClientHandler;

/// SSH 会话（连接成功后）
pub struct SshSession {
    /// 会话 ID
    id: String,
    /// 共享的 russh Handle
    handle: Arc<Handle<SshClientHandler>>,
    /// 服务器主机名
    host: String,
    /// 服务器端口
    port: u16,
    /// 用户名
    username: String,
    /// 连接状态
    is_connected: AtomicBool,
}

impl SshSession {
    /// 创建新的会话
    pub fn new(
        id: String,
        handle: Arc<Handle<SshClientHandler>>,
        host: String,
        port: u16,
        username: String,
    ) -> Self {
        Self {
            id,
            handle,
            host,
            port,
            username,
            is_connected: AtomicBool::new(true),
        }
    }

    /// 获取会话 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// 检查会话是否存活（未主动关闭且底层连接未断开）
    pub fn is_alive(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst) && !self.handle.is_closed()
    }

    /// 打开 SFTP 子系统
    pub async fn open_sftp(&self, open_timeout: Duration) -> Result<SftpSession, SshError> {
        if !self.is_alive() {
            return Err(SshError::Disconnected(
                "Session is disconnected".to_string(),
            ));
        }

        let secs = open_timeout.as_secs();
        let channel = timeout(open_timeout, self.handle.channel_open_session())
            .await
            .map_err(|_| SshError::Timeout(secs))?
            .map_err(|e| SshError::Channel(format!("Failed to open session channel: {}", e)))?;

        // 请求 SFTP 子系统
        timeout(open_timeout, channel.request_subsystem(true, "sftp"))
            .await
            .map_err(|_| SshError::Timeout(secs))?
            .map_err(|e| SshError::Channel(format!("Failed to request sftp subsystem: {}", e)))?;

        let sftp = timeout(open_timeout, SftpSession::new(channel.into_stream()))
            .await
            .map_err(|_| SshError::Timeout(secs))?
            .map_err(|e| SshError::Channel(format!("SFTP init failed: {}", e)))?;

        debug!("[SFTP] Subsystem opened on {}:{}", self.host, self.port);
        Ok(sftp)
    }

    /// 关闭会话
    pub async fn close(&self) -> Result<(), SshError> {
        if !self.is_connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(SshError::from)
    }
}
