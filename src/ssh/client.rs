// SSH 客户端核心实现

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::Handle;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use super::config::SshConfig;
use super::error::SshError;
use super::event::HostKeyDecider;
use super::handler::SshClientHandler;
use super::session::SshSession;
use crate::services::identity::KeyIdentity;
use crate::services::known_hosts::HostTrustStore;

/// 解析目标地址
///
/// 解析失败与网络错误同样可重试
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<SocketAddr, SshError> {
    let addr = format!("{}:{}", host, port);
    let mut addrs = timeout(limit, lookup_host(&addr))
        .await
        .map_err(|_| SshError::Timeout(limit.as_secs()))?
        .map_err(SshError::Io)?;
    addrs
        .next()
        .ok_or_else(|| SshError::Transport(format!("No address found for {}", addr)))
}

/// SSH 客户端
/// 负责建立 SSH 连接并返回 SshSession
pub struct SshClient {
    /// 连接配置
    config: SshConfig,
    identity: Arc<KeyIdentity>,
    trust_store: Arc<HostTrustStore>,
    decider: Arc<dyn HostKeyDecider>,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(
        config: SshConfig,
        identity: Arc<KeyIdentity>,
        trust_store: Arc<HostTrustStore>,
        decider: Arc<dyn HostKeyDecider>,
    ) -> Self {
        Self {
            config,
            identity,
            trust_store,
            decider,
        }
    }

    /// 执行连接（异步）
    /// 返回 SshSession 用于后续操作
    pub async fn connect(&self) -> Result<SshSession, SshError> {
        // 没有密钥时不发起任何网络连接
        let key = self.identity.load_private_key()?;

        info!("[SSH] Connecting to {}", self.config.target());

        // 解析地址
        let connect_timeout = self.config.connect_timeout();
        let socket_addr = resolve(&self.config.host, self.config.port, connect_timeout).await?;

        // TCP 连接
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
            .map_err(SshError::Io)?;

        debug!("[SSH] TCP connection established to {}", socket_addr);

        // SSH 握手（包含等待主机密钥确认的时间）
        let russh_config = Arc::new(self.config.to_russh_config());
        let handler = SshClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.trust_store.clone(),
            self.decider.clone(),
            self.config.decision_timeout(),
        );

        let handshake_timeout = connect_timeout + self.config.decision_timeout();
        let mut handle = timeout(
            handshake_timeout,
            russh::client::connect_stream(russh_config, tcp_stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(handshake_timeout.as_secs()))??;

        debug!("[SSH] Handshake completed with {}", self.config.target());

        // 认证
        self.authenticate(&mut handle, key).await?;

        info!("[SSH] Connected to {}", self.config.target());

        Ok(SshSession::new(
            uuid::Uuid::new_v4().to_string(),
            Arc::new(handle),
            self.config.host.clone(),
            self.config.port,
            self.config.username.clone(),
        ))
    }

    /// 公钥认证
    async fn authenticate(
        &self,
        handle: &mut Handle<SshClientHandler>,
        key: PrivateKey,
    ) -> Result<(), SshError> {
        use russh::client::AuthResult;

        debug!(
            "[SSH] Authenticating as '{}' with public key",
            self.config.username
        );

        let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);

        let auth_result = timeout(
            self.config.connect_timeout(),
            handle.authenticate_publickey(&self.config.username, key_with_alg),
        )
        .await
        .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
        .map_err(SshError::from)?;

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                if partial_success {
                    return Err(SshError::Auth(
                        "Partial authentication - additional auth required".to_string(),
                    ));
                }
                Err(SshError::Auth(format!(
                    "Public key authentication failed. Server suggests: {:?}",
                    remaining_methods
                )))
            }
        }
    }
}
