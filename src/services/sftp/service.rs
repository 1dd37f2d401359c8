// SFTP 服务 - 封装 russh-sftp 客户端

use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::constants::READ_CHUNK_SIZE;
use crate::models::sftp::{DirRecord, FileType};
use crate::ssh::channel::RemoteFs;
use crate::ssh::error::SshError;
use crate::ssh::session::SshSession;

/// 按固定大小分块读取直到 EOF
pub async fn read_to_end_chunked<R>(reader: &mut R, chunk_size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut content = Vec::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&buf[..n]);
    }
    Ok(content)
}

fn file_type_of(attrs: &russh_sftp::protocol::FileAttributes) -> FileType {
    if attrs.is_dir() {
        FileType::Directory
    } else if attrs.is_symlink() {
        FileType::Symlink
    } else {
        // russh-sftp 没有 is_file()，默认为普通文件
        FileType::File
    }
}

/// SFTP 服务
/// 一个 SSH 会话加上其上的 SFTP 子系统，作为连接池中的一个通道
pub struct SftpService {
    session: Arc<SshSession>,
    sftp: SftpSession,
}

impl SftpService {
    /// 在已认证的会话上打开 SFTP 子系统
    pub async fn open(session: SshSession, open_timeout: std::time::Duration) -> Result<Self, SshError> {
        let session = Arc::new(session);
        let sftp = match session.open_sftp(open_timeout).await {
            Ok(sftp) => sftp,
            Err(e) => {
                // 子系统打开失败时不留下半开的会话
                let _ = session.close().await;
                return Err(e);
            }
        };

        info!(
            "[SFTP] SFTP service created for {}@{}:{} (session {})",
            session.username(),
            session.host(),
            session.port(),
            session.id()
        );

        Ok(Self { session, sftp })
    }
}

#[async_trait]
impl RemoteFs for SftpService {
    fn is_alive(&self) -> bool {
        self.session.is_alive()
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirRecord>, SshError> {
        debug!("[SFTP] Reading directory: {}", path);

        let dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| SshError::from_sftp("list", path, e))?;

        let records: Vec<DirRecord> = dir
            .map(|entry| {
                let attrs = entry.metadata();
                DirRecord {
                    name: entry.file_name(),
                    file_type: file_type_of(&attrs),
                    size: attrs.size.unwrap_or(0),
                    mtime: attrs.mtime.map(u64::from).unwrap_or(0),
                    permissions: attrs.permissions.unwrap_or(0),
                }
            })
            .collect();

        debug!("[SFTP] Read {} entries from {}", records.len(), path);
        Ok(records)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SshError> {
        debug!("[SFTP] Reading file: {}", path);

        let mut file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| SshError::from_sftp("read", path, e))?;

        let content = read_to_end_chunked(&mut file, READ_CHUNK_SIZE)
            .await
            .map_err(|e| SshError::Channel(format!("SFTP read '{}': {}", path, e)))?;

        debug!("[SFTP] Read {} bytes from {}", content.len(), path);
        Ok(content)
    }

    async fn stat_size(&self, path: &str) -> Result<u64, SshError> {
        debug!("[SFTP] Getting stat for: {}", path);

        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| SshError::from_sftp("stat", path, e))?;

        Ok(attrs.size.unwrap_or(0))
    }

    async fn close(&self) {
        if let Err(e) = self.sftp.close().await {
            debug!("[SFTP] Closing subsystem failed: {}", e);
        }
        if let Err(e) = self.session.close().await {
            debug!("[SFTP] Closing session {} failed: {}", self.session.id(), e);
        }
    }
}
