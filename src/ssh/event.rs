// 主机密钥确认事件定义
//
// 连接过程中遇到未知主机或密钥变化时，由外部（UI / 命令行）决定是否信任

use std::fmt;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// 主机密钥校验结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyVerdict {
    /// 从未见过的主机
    NewHost,
    /// 与已保存的指纹一致
    Match,
    /// 与已保存的指纹不一致（可能存在中间人攻击）
    Changed,
}

impl HostKeyVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewHost => "NEW_HOST",
            Self::Match => "MATCH",
            Self::Changed => "CHANGED",
        }
    }
}

impl fmt::Display for HostKeyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 需要用户确认的主机密钥信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostKeyPrompt {
    pub host: String,
    pub port: u16,
    /// 密钥类型（ssh-ed25519, ssh-rsa 等）
    pub key_type: String,
    /// SHA256 指纹
    pub fingerprint: String,
    /// NewHost 或 Changed
    pub verdict: HostKeyVerdict,
}

/// 用户对主机密钥的选择
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyAction {
    /// 信任并保存
    Accept,
    /// 拒绝连接
    Reject,
}

/// 主机密钥决策者
///
/// 连接在握手阶段挂起，直到决策返回
#[async_trait]
pub trait HostKeyDecider: Send + Sync {
    async fn decide(&self, prompt: HostKeyPrompt) -> HostKeyAction;
}

/// 一律拒绝未知 / 变化的主机密钥（无人值守场景）
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectUnknown;

#[async_trait]
impl HostKeyDecider for RejectUnknown {
    async fn decide(&self, prompt: HostKeyPrompt) -> HostKeyAction {
        warn!(
            "[HostKey] Rejecting {} key for {}:{} ({})",
            prompt.verdict, prompt.host, prompt.port, prompt.fingerprint
        );
        HostKeyAction::Reject
    }
}

/// 发送给 UI 的确认请求，UI 通过 respond 回复
#[derive(Debug)]
pub struct HostKeyRequest {
    pub prompt: HostKeyPrompt,
    pub respond: oneshot::Sender<HostKeyAction>,
}

/// 通过通道把确认请求转交给 UI 任务
#[derive(Clone)]
pub struct ChannelDecider {
    sender: mpsc::UnboundedSender<HostKeyRequest>,
}

impl ChannelDecider {
    /// 创建决策者，返回值中的接收端交给 UI 处理
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostKeyRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl HostKeyDecider for ChannelDecider {
    async fn decide(&self, prompt: HostKeyPrompt) -> HostKeyAction {
        let (respond, response_rx) = oneshot::channel();
        let host = format!("{}:{}", prompt.host, prompt.port);

        if self.sender.send(HostKeyRequest { prompt, respond }).is_err() {
            debug!("[HostKey] No UI listening for {}, rejecting", host);
            return HostKeyAction::Reject;
        }

        // UI 丢弃了 respond 视为拒绝
        response_rx.await.unwrap_or(HostKeyAction::Reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(verdict: HostKeyVerdict) -> HostKeyPrompt {
        HostKeyPrompt {
            host: "files.example.org".to_string(),
            port: 22,
            key_type: "ssh-ed25519".to_string(),
            fingerprint: "SHA256:abc".to_string(),
            verdict,
        }
    }

    #[tokio::test]
    async fn test_channel_decider_forwards_answer() {
        let (decider, mut requests) = ChannelDecider::new();

        let ui = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(request.prompt.verdict, HostKeyVerdict::NewHost);
            request.respond.send(HostKeyAction::Accept).unwrap();
        });

        let action = decider.decide(prompt(HostKeyVerdict::NewHost)).await;
        assert_eq!(action, HostKeyAction::Accept);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_decider_rejects_when_ui_drops_request() {
        let (decider, mut requests) = ChannelDecider::new();

        let ui = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            drop(request);
        });

        let action = decider.decide(prompt(HostKeyVerdict::Changed)).await;
        assert_eq!(action, HostKeyAction::Reject);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_decider_rejects_without_ui() {
        let (decider, requests) = ChannelDecider::new();
        drop(requests);
        assert_eq!(
            decider.decide(prompt(HostKeyVerdict::NewHost)).await,
            HostKeyAction::Reject
        );
    }

    #[tokio::test]
    async fn test_reject_unknown() {
        assert_eq!(
            RejectUnknown.decide(prompt(HostKeyVerdict::NewHost)).await,
            HostKeyAction::Reject
        );
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(HostKeyVerdict::Changed.to_string(), "CHANGED");
    }
}
