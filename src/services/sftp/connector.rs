// 真实的 SFTP 通道连接器：SSH 连接 + 主机密钥校验 + 公钥认证 + SFTP 子系统

use std::sync::Arc;

use async_trait::async_trait;

use super::service::SftpService;
use crate::services::identity::KeyIdentity;
use crate::services::known_hosts::HostTrustStore;
use crate::ssh::channel::{SftpChannel, SftpConnector};
use crate::ssh::client::SshClient;
use crate::ssh::config::SshConfig;
use crate::ssh::error::SshError;
use crate::ssh::event::HostKeyDecider;

pub struct SshConnector {
    identity: Arc<KeyIdentity>,
    trust_store: Arc<HostTrustStore>,
    decider: Arc<dyn HostKeyDecider>,
}

impl SshConnector {
    pub fn new(
        identity: Arc<KeyIdentity>,
        trust_store: Arc<HostTrustStore>,
        decider: Arc<dyn HostKeyDecider>,
    ) -> Self {
        Self {
            identity,
            trust_store,
            decider,
        }
    }
}

#[async_trait]
impl SftpConnector for SshConnector {
    async fn connect(&self, config: &SshConfig) -> Result<SftpChannel, SshError> {
        let client = SshClient::new(
            config.clone(),
            self.identity.clone(),
            self.trust_store.clone(),
            self.decider.clone(),
        );
        let session = client.connect().await?;
        let service = SftpService::open(session, config.connect_timeout()).await?;
        Ok(Arc::new(service) as SftpChannel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use russh::keys::ssh_key::private::Ed25519Keypair;
    use russh::keys::PrivateKey;
    use russh::server::{Auth, Msg, Session};
    use russh::{Channel, ChannelId};
    use russh_sftp::protocol::{Attrs, FileAttributes, StatusCode};
    use tokio::net::TcpListener;
    use tokio::runtime::Handle;

    use crate::models::ClientSettings;
    use crate::services::known_hosts::host_id;
    use crate::services::sftp::access::FileAccessService;
    use crate::ssh::event::{HostKeyAction, HostKeyPrompt, HostKeyVerdict, RejectUnknown};
    use crate::ssh::pool::ConnectionPool;
    use crate::ssh::reconnect::RetryPolicy;

    fn server_key(seed: u8) -> PrivateKey {
        PrivateKey::from(Ed25519Keypair::from_seed(&[seed; 32]))
    }

    /// 只实现 stat 的 SFTP 服务端，/data.bin 大小为 42
    struct StatOnlySftp;

    impl russh_sftp::server::Handler for StatOnlySftp {
        type Error = StatusCode;

        fn unimplemented(&self) -> Self::Error {
            StatusCode::OpUnsupported
        }

        async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
            if path != "/data.bin" {
                return Err(StatusCode::NoSuchFile);
            }
            Ok(Attrs {
                id,
                attrs: FileAttributes {
                    size: Some(42),
                    ..Default::default()
                },
            })
        }
    }

    /// 接受任意公钥并提供 sftp 子系统的 SSH 服务端
    #[derive(Default)]
    struct TestServer {
        channels: HashMap<ChannelId, Channel<Msg>>,
    }

    impl russh::server::Handler for TestServer {
        type Error = russh::Error;

        async fn auth_publickey(
            &mut self,
            _user: &str,
            _public_key: &russh::keys::PublicKey,
        ) -> Result<Auth, Self::Error> {
            Ok(Auth::Accept)
        }

        async fn channel_open_session(
            &mut self,
            channel: Channel<Msg>,
            _session: &mut Session,
        ) -> Result<bool, Self::Error> {
            self.channels.insert(channel.id(), channel);
            Ok(true)
        }

        async fn subsystem_request(
            &mut self,
            channel_id: ChannelId,
            name: &str,
            session: &mut Session,
        ) -> Result<(), Self::Error> {
            match self.channels.remove(&channel_id) {
                Some(channel) if name == "sftp" => {
                    session.channel_success(channel_id)?;
                    russh_sftp::server::run(channel.into_stream(), StatOnlySftp).await;
                }
                _ => session.channel_failure(channel_id)?,
            }
            Ok(())
        }
    }

    /// 在 127.0.0.1 上启动服务端，返回端口；每个新连接使用当时的主机密钥
    async fn spawn_server(host_key: Arc<Mutex<PrivateKey>>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let key = host_key.lock().unwrap().clone();
                let config = Arc::new(russh::server::Config {
                    keys: vec![key],
                    inactivity_timeout: None,
                    auth_rejection_time: Duration::from_millis(10),
                    ..Default::default()
                });
                tokio::spawn(async move {
                    if let Ok(session) =
                        russh::server::run_stream(config, stream, TestServer::default()).await
                    {
                        let _ = session.await;
                    }
                });
            }
        });

        port
    }

    /// 首次见到的主机一律接受，密钥变化一律拒绝
    #[derive(Default)]
    struct FirstUseDecider {
        verdicts: Mutex<Vec<HostKeyVerdict>>,
    }

    impl FirstUseDecider {
        fn verdicts(&self) -> Vec<HostKeyVerdict> {
            self.verdicts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HostKeyDecider for FirstUseDecider {
        async fn decide(&self, prompt: HostKeyPrompt) -> HostKeyAction {
            self.verdicts.lock().unwrap().push(prompt.verdict);
            match prompt.verdict {
                HostKeyVerdict::NewHost => HostKeyAction::Accept,
                _ => HostKeyAction::Reject,
            }
        }
    }

    fn identity(dir: &tempfile::TempDir) -> Arc<KeyIdentity> {
        let identity = KeyIdentity::new(dir.path().join("keys")).with_comment("test@e2e");
        identity.generate().unwrap();
        Arc::new(identity)
    }

    #[tokio::test]
    async fn test_pool_trusts_on_first_use_and_rejects_changed_key() {
        let dir = tempfile::tempdir().unwrap();
        let trust_store =
            Arc::new(HostTrustStore::open(dir.path().join("known_hosts.json")).unwrap());
        let decider = Arc::new(FirstUseDecider::default());
        let connector = SshConnector::new(identity(&dir), trust_store.clone(), decider.clone());
        let pool = ConnectionPool::new(Arc::new(connector), ClientSettings::default());

        let host_key = Arc::new(Mutex::new(server_key(1)));
        let port = spawn_server(host_key.clone()).await;
        let key_blob = server_key(1).public_key().to_bytes().unwrap();

        // 首次连接：询问后信任，SFTP 请求经过真实通道
        let channel = pool.acquire("127.0.0.1", port).await.unwrap();
        assert_eq!(channel.stat_size("/data.bin").await.unwrap(), 42);
        assert!(matches!(
            channel.stat_size("/missing").await,
            Err(SshError::Remote { op: "stat", .. })
        ));
        assert_eq!(
            trust_store.verify(&host_id("127.0.0.1", port), &key_blob),
            HostKeyVerdict::Match
        );

        // 重新连接：密钥一致，不再询问
        pool.release("127.0.0.1", port).await;
        assert!(!channel.is_alive());
        pool.acquire("127.0.0.1", port).await.unwrap();
        assert_eq!(decider.verdicts(), vec![HostKeyVerdict::NewHost]);

        // 服务端换了密钥：拒绝，池中不留下连接
        pool.release("127.0.0.1", port).await;
        *host_key.lock().unwrap() = server_key(2);
        let Err(err) = pool.acquire("127.0.0.1", port).await else {
            panic!("changed host key was accepted");
        };
        assert!(matches!(
            err,
            SshError::HostKeyRejected {
                verdict: HostKeyVerdict::Changed,
                ..
            }
        ));
        assert!(!pool.is_pooled("127.0.0.1", port).await);
        assert_eq!(
            decider.verdicts(),
            vec![HostKeyVerdict::NewHost, HostKeyVerdict::Changed]
        );
        // 原记录保持不变
        assert_eq!(
            trust_store.verify(&host_id("127.0.0.1", port), &key_blob),
            HostKeyVerdict::Match
        );
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_retried_until_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let trust_store =
            Arc::new(HostTrustStore::open(dir.path().join("known_hosts.json")).unwrap());
        let connector = SshConnector::new(identity(&dir), trust_store, Arc::new(RejectUnknown));
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(connector),
            ClientSettings::default(),
        ));
        let svc = FileAccessService::new(pool, RetryPolicy::new(3, 0), Handle::current());

        let err = svc.list("no-such-host.invalid", 22, "/").await.unwrap_err();

        match err {
            SshError::ExhaustedRetries {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(source.is_retryable(), "got {:?}", source);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
