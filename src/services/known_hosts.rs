// 主机密钥信任存储（TOFU）
//
// 每个主机只保存一个指纹；首次连接需外部确认后写入，之后每次连接比对。
// 指纹变化时绝不自动接受，只能通过 trust() 显式覆盖。

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::models::{KnownHost, KnownHostsConfig};
use crate::services::storage;
use crate::ssh::error::SshError;
use crate::ssh::event::HostKeyVerdict;

/// 计算公钥指纹，格式与 OpenSSH 一致：`SHA256:<base64 无填充>`
pub fn fingerprint(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// 信任存储中主机的标识：端口 22 使用 host，其余使用 [host]:port
pub fn host_id(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// 持久化的主机密钥信任表
///
/// 读多写少：verify 只取读锁，trust / remove 取写锁并落盘
pub struct HostTrustStore {
    path: PathBuf,
    hosts: RwLock<KnownHostsConfig>,
}

impl HostTrustStore {
    /// 从指定文件加载（文件不存在时为空表）
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SshError> {
        let path = path.into();
        let hosts = storage::load_known_hosts_from(&path)
            .map_err(|e| SshError::Storage(format!("{:#}", e)))?;
        debug!(
            "[HostKey] Loaded {} trusted hosts from {}",
            hosts.hosts.len(),
            path.display()
        );
        Ok(Self {
            path,
            hosts: RwLock::new(hosts),
        })
    }

    /// 使用默认配置目录下的 known_hosts.json
    pub fn open_default() -> Result<Self, SshError> {
        let path = storage::get_known_hosts_file()
            .map_err(|e| SshError::Storage(format!("{:#}", e)))?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 校验主机密钥，无副作用
    pub fn verify(&self, host: &str, public_key: &[u8]) -> HostKeyVerdict {
        let presented = fingerprint(public_key);
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());

        match hosts.find(host) {
            None => HostKeyVerdict::NewHost,
            Some(known) if known.fingerprint == presented => HostKeyVerdict::Match,
            Some(_) => HostKeyVerdict::Changed,
        }
    }

    /// 信任主机密钥（新建或覆盖），立即落盘
    pub fn trust(&self, host: &str, public_key: &[u8]) -> Result<(), SshError> {
        let fp = fingerprint(public_key);
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = hosts.clone();
        let now = now();

        match updated.find_mut(host) {
            Some(known) if known.fingerprint == fp => {
                known.last_used = now;
            }
            Some(known) => {
                warn!(
                    "[HostKey] Replacing trusted key for {}: {} -> {}",
                    host, known.fingerprint, fp
                );
                known.fingerprint = fp;
                known.first_seen = now.clone();
                known.last_used = now;
            }
            None => {
                info!("[HostKey] Trusting new host {} ({})", host, fp);
                updated.hosts.push(KnownHost {
                    host: host.to_string(),
                    fingerprint: fp,
                    first_seen: now.clone(),
                    last_used: now,
                });
            }
        }

        storage::save_known_hosts_to(&self.path, &updated)
            .map_err(|e| SshError::Storage(format!("{:#}", e)))?;
        *hosts = updated;
        Ok(())
    }

    /// 更新已信任主机的最后使用时间（失败只记录日志）
    pub fn touch(&self, host: &str) {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let Some(known) = hosts.find_mut(host) else {
            return;
        };
        known.last_used = now();

        if let Err(e) = storage::save_known_hosts_to(&self.path, &hosts) {
            warn!("[HostKey] Failed to record last use of {}: {:#}", host, e);
        }
    }

    /// 删除主机记录（仅用于用户显式操作），返回是否存在
    pub fn remove(&self, host: &str) -> Result<bool, SshError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let before = hosts.hosts.len();
        let mut updated = hosts.clone();
        updated.hosts.retain(|h| h.host != host);

        if updated.hosts.len() == before {
            return Ok(false);
        }

        storage::save_known_hosts_to(&self.path, &updated)
            .map_err(|e| SshError::Storage(format!("{:#}", e)))?;
        *hosts = updated;
        info!("[HostKey] Forgot host {}", host);
        Ok(true)
    }

    /// 当前信任的所有主机
    pub fn entries(&self) -> Vec<KnownHost> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .hosts
            .clone()
    }
}
