// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait，在握手阶段执行 TOFU 主机密钥校验

use std::sync::Arc;
use std::time::Duration;

use russh::keys::PublicKey;
use tracing::{debug, info, warn};

use super::error::SshError;
use super::event::{HostKeyAction, HostKeyDecider, HostKeyPrompt, HostKeyVerdict};
use crate::services::known_hosts::{fingerprint, host_id, HostTrustStore};

/// 校验服务器公钥
///
/// - MATCH：直接放行
/// - NEW_HOST / CHANGED：交给决策者，超时视为拒绝；接受后写入信任表
pub async fn check_host_key(
    trust_store: &HostTrustStore,
    decider: &dyn HostKeyDecider,
    decision_timeout: Duration,
    host: &str,
    port: u16,
    key_type: &str,
    key_blob: &[u8],
) -> Result<(), SshError> {
    let id = host_id(host, port);
    let fp = fingerprint(key_blob);
    let verdict = trust_store.verify(&id, key_blob);

    debug!(
        "[HostKey] {}:{} presented {} key {} => {}",
        host, port, key_type, fp, verdict
    );

    if verdict == HostKeyVerdict::Match {
        trust_store.touch(&id);
        return Ok(());
    }

    if verdict == HostKeyVerdict::Changed {
        warn!(
            "[HostKey] WARNING: host key for {}:{} has changed! New fingerprint: {}",
            host, port, fp
        );
    }

    let prompt = HostKeyPrompt {
        host: host.to_string(),
        port,
        key_type: key_type.to_string(),
        fingerprint: fp.clone(),
        verdict,
    };

    let action = match tokio::time::timeout(decision_timeout, decider.decide(prompt)).await {
        Ok(action) => action,
        Err(_) => {
            warn!(
                "[HostKey] No decision for {}:{} within {}s, rejecting",
                host,
                port,
                decision_timeout.as_secs()
            );
            HostKeyAction::Reject
        }
    };

    match action {
        HostKeyAction::Accept => {
            trust_store.trust(&id, key_blob)?;
            info!("[HostKey] Host key for {}:{} accepted: {}", host, port, fp);
            Ok(())
        }
        HostKeyAction::Reject => Err(SshError::HostKeyRejected {
            host: host.to_string(),
            port,
            fingerprint: fp,
            verdict,
        }),
    }
}

/// SSH 客户端 Handler
pub struct SshClientHandler {
    /// 服务器主机名
    host: String,
    /// 服务器端口
    port: u16,
    trust_store: Arc<HostTrustStore>,
    decider: Arc<dyn HostKeyDecider>,
    decision_timeout: Duration,
}

impl SshClientHandler {
    /// 创建新的 Handler
    pub fn new(
        host: String,
        port: u16,
        trust_store: Arc<HostTrustStore>,
        decider: Arc<dyn HostKeyDecider>,
        decision_timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            trust_store,
            decider,
            decision_timeout,
        }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = SshError;

    /// 检查服务器公钥
    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let key_blob = server_public_key
            .to_bytes()
            .map_err(|e| SshError::Key(format!("Failed to encode host key: {}", e)))?;
        let key_type = server_public_key.algorithm().to_string();

        check_host_key(
            &self.trust_store,
            self.decider.as_ref(),
            self.decision_timeout,
            &self.host,
            self.port,
            &key_type,
            &key_blob,
        )
        .await?;

        Ok(true)
    }
}
