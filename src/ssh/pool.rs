// SFTP 连接池
//
// 每个 (host, port) 最多一个会话。同一目标的建立过程由该目标的槽位锁串行化，
// 并发的 acquire 只会触发一次连接；不同目标互不阻塞。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::channel::{same_channel, SftpChannel, SftpConnector};
use super::config::SshConfig;
use super::error::SshError;
use crate::models::ClientSettings;

/// 连接池键
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 单个目标的槽位，持锁期间完成建立
type Slot = Arc<tokio::sync::Mutex<Option<SftpChannel>>>;

/// SFTP 连接池
pub struct ConnectionPool {
    connector: Arc<dyn SftpConnector>,
    settings: ClientSettings,
    slots: Mutex<HashMap<PoolKey, Slot>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn SftpConnector>, settings: ClientSettings) -> Self {
        Self {
            connector,
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn slot(&self, key: &PoolKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    fn existing_slot(&self, key: &PoolKey) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    fn all_slots(&self) -> Vec<(PoolKey, Slot)> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// 槽位为空且没有其他任务持有时从表中移除
    ///
    /// 槽位只能在表锁下被克隆，持表锁时引用计数为 2（表与调用方）即无人等待
    fn forget_if_idle(&self, key: &PoolKey, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let is_ours = slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot));
        if !is_ours || Arc::strong_count(slot) != 2 {
            return;
        }
        let is_empty = slot.try_lock().is_ok_and(|current| current.is_none());
        if is_empty {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 获取到目标的可用通道
    ///
    /// 已有存活通道时直接复用；通道已失效时先关闭再重建。
    /// 建立失败时池中不留下任何记录。
    pub async fn acquire(&self, host: &str, port: u16) -> Result<SftpChannel, SshError> {
        let key = PoolKey::new(host, port);
        let slot = self.slot(&key);
        let mut current = slot.lock().await;

        if let Some(channel) = current.as_ref() {
            if channel.is_alive() {
                return Ok(channel.clone());
            }
        }

        if let Some(stale) = current.take() {
            warn!("[Pool] Connection to {} is no longer alive, reconnecting", key);
            stale.close().await;
        }

        let config = SshConfig::for_target(host, port, &self.settings);
        debug!("[Pool] Establishing connection to {}", config.target());
        let channel = match self.connector.connect(&config).await {
            Ok(channel) => channel,
            Err(e) => {
                drop(current);
                self.forget_if_idle(&key, &slot);
                return Err(e);
            }
        };

        info!("[Pool] Connection to {} established", key);
        *current = Some(channel.clone());
        Ok(channel)
    }

    /// 关闭并移除目标的连接，不存在时无操作
    pub async fn release(&self, host: &str, port: u16) {
        let key = PoolKey::new(host, port);
        let Some(slot) = self.existing_slot(&key) else {
            return;
        };

        let channel = slot.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
            info!("[Pool] Released connection to {}", key);
        }
        self.forget_if_idle(&key, &slot);
    }

    /// 操作失败后丢弃通道
    ///
    /// 只有当池中仍是这个通道时才移除，避免误关其他任务刚建立的新连接
    pub async fn discard(&self, host: &str, port: u16, channel: &SftpChannel) {
        let key = PoolKey::new(host, port);
        let Some(slot) = self.existing_slot(&key) else {
            return;
        };

        let mut current = slot.lock().await;
        let is_current = current
            .as_ref()
            .is_some_and(|pooled| same_channel(pooled, channel));

        let stale = if is_current { current.take() } else { None };
        drop(current);

        if let Some(stale) = stale {
            stale.close().await;
            debug!("[Pool] Discarded connection to {}", key);
        }
        self.forget_if_idle(&key, &slot);
    }

    /// 关闭所有连接
    pub async fn release_all(&self) {
        let slots = self.all_slots();
        let closed = join_all(slots.into_iter().map(|(key, slot)| async move {
            let channel = slot.lock().await.take();
            let closed = match channel {
                Some(channel) => {
                    channel.close().await;
                    debug!("[Pool] Closed connection to {}", key);
                    1
                }
                None => 0,
            };
            self.forget_if_idle(&key, &slot);
            closed
        }))
        .await
        .into_iter()
        .sum::<usize>();

        if closed > 0 {
            info!("[Pool] Released {} connections", closed);
        }
    }

    /// 池中是否有到目标的存活连接
    pub async fn is_pooled(&self, host: &str, port: u16) -> bool {
        let Some(slot) = self.existing_slot(&PoolKey::new(host, port)) else {
            return false;
        };
        let current = slot.lock().await;
        current.as_ref().is_some_and(|channel| channel.is_alive())
    }

    /// 池中存活连接数
    pub async fn pooled_count(&self) -> usize {
        let mut count = 0;
        for (_, slot) in self.all_slots() {
            if slot
                .lock()
                .await
                .as_ref()
                .is_some_and(|channel| channel.is_alive())
            {
                count += 1;
            }
        }
        count
    }
}
