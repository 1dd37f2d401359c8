// SSH 身份密钥管理
//
// 生成并保存一对 Ed25519 密钥：私钥以 OpenSSH PEM 格式保存（0600），
// 公钥以 authorized_keys 行格式保存，供用户复制到远程主机。

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use russh::keys::ssh_key::private::Ed25519Keypair;
use russh::keys::ssh_key::LineEnding;
use russh::keys::PrivateKey;
use tracing::{debug, info};

use crate::constants::files;
use crate::services::storage;
use crate::ssh::error::SshError;

const KEY_TYPE: &str = "ssh-ed25519";

/// 将 32 字节 Ed25519 公钥编码为 OpenSSH 公钥行
///
/// blob = string("ssh-ed25519") || string(key)，string 为 4 字节大端长度前缀
pub fn encode_openssh_public_key(public_key: &[u8; 32], comment: &str) -> String {
    let mut blob = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + public_key.len());
    blob.extend_from_slice(&(KEY_TYPE.len() as u32).to_be_bytes());
    blob.extend_from_slice(KEY_TYPE.as_bytes());
    blob.extend_from_slice(&(public_key.len() as u32).to_be_bytes());
    blob.extend_from_slice(public_key);

    let encoded = STANDARD.encode(&blob);
    if comment.is_empty() {
        format!("{} {}", KEY_TYPE, encoded)
    } else {
        format!("{} {} {}", KEY_TYPE, encoded, comment)
    }
}

/// 公钥注释，形如 sftp-access@<主机名>
fn default_comment() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "device".to_string());
    format!("{}@{}", crate::constants::APP_DIR_NAME, host.trim())
}

/// 本机 SSH 身份
pub struct KeyIdentity {
    private_path: PathBuf,
    public_path: PathBuf,
    comment: String,
    // generate 与读取互斥
    lock: RwLock<()>,
}

impl KeyIdentity {
    /// 使用指定目录保存密钥
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            private_path: dir.join(files::PRIVATE_KEY),
            public_path: dir.join(files::PUBLIC_KEY),
            comment: default_comment(),
            lock: RwLock::new(()),
        }
    }

    /// 使用默认配置目录下的 keys/
    pub fn open_default() -> Result<Self, SshError> {
        let dir = storage::get_keys_dir().map_err(|e| SshError::Storage(format!("{:#}", e)))?;
        Ok(Self::new(dir))
    }

    /// 指定公钥注释
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_path
    }

    /// 私钥与公钥文件是否都存在
    pub fn has_identity(&self) -> bool {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        self.private_path.exists() && self.public_path.exists()
    }

    /// 生成新的密钥对，覆盖已有密钥
    ///
    /// 已授权旧公钥的远程主机需要重新授权，调用方负责确认
    pub fn generate(&self) -> Result<(), SshError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());

        let seed: [u8; 32] = rand::thread_rng().gen();
        let keypair = Ed25519Keypair::from_seed(&seed);
        let public_point = keypair.public.0;
        let private_key = PrivateKey::from(keypair);

        let pem = private_key
            .to_openssh(LineEnding::LF)
            .map_err(|e| SshError::Key(format!("Failed to encode private key: {}", e)))?;
        let public_line = encode_openssh_public_key(&public_point, &self.comment);

        storage::write_key_pair(
            &self.private_path,
            pem.as_bytes(),
            &self.public_path,
            format!("{}\n", public_line).as_bytes(),
        )
        .map_err(|e| SshError::Key(format!("{:#}", e)))?;

        info!(
            "[Identity] Generated Ed25519 key pair at {}",
            self.private_path.display()
        );
        Ok(())
    }

    /// OpenSSH 格式公钥（ssh-ed25519 <base64> <comment>），无密钥时返回 None
    pub fn public_key_openssh(&self) -> Option<String> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        if !self.private_path.exists() {
            return None;
        }

        match std::fs::read_to_string(&self.public_path) {
            Ok(content) => Some(content.trim().to_string()).filter(|line| !line.is_empty()),
            Err(e) => {
                debug!("[Identity] Failed to read public key: {}", e);
                None
            }
        }
    }

    /// 加载私钥用于认证
    pub fn load_private_key(&self) -> Result<PrivateKey, SshError> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        if !self.private_path.exists() || !self.public_path.exists() {
            return Err(SshError::NoIdentity);
        }

        let pem = std::fs::read_to_string(&self.private_path)
            .map_err(|e| SshError::Key(format!("Failed to read key file: {}", e)))?;
        russh::keys::decode_secret_key(&pem, None)
            .map_err(|e| SshError::Key(format!("Failed to decode key: {}", e)))
    }
}
