// SSH 连接配置

use std::time::Duration;

use crate::models::settings::ClientSettings;

/// SSH 连接配置（每个目标主机一份）
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 连接超时（秒），覆盖 TCP 连接、认证与通道打开
    pub connect_timeout: u64,
    /// 等待用户确认主机密钥的超时（秒）
    pub decision_timeout: u64,
    /// 心跳配置
    pub keepalive: KeepaliveConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: "root".to_string(),
            connect_timeout: 10,
            decision_timeout: 60,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl SshConfig {
    /// 由全局设置生成指定目标的配置
    pub fn for_target(host: &str, port: u16, settings: &ClientSettings) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: settings.effective_username().to_string(),
            connect_timeout: settings.connect_timeout_secs,
            decision_timeout: settings.decision_timeout_secs,
            keepalive: KeepaliveConfig {
                enabled: settings.keepalive_interval_secs > 0,
                interval: settings.keepalive_interval_secs,
                max_retries: 3,
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout)
    }

    /// 用于日志的目标描述
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// 心跳配置
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// 是否启用心跳
    pub enabled: bool,
    /// 心跳间隔（秒）
    pub interval: u64,
    /// 最大重试次数
    pub max_retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 30,
            max_retries: 3,
        }
    }
}

/// russh 客户端配置构建
impl SshConfig {
    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config::default();
        // 心跳开启时由 keepalive 负责探测死连接，不设不活动超时
        if self.keepalive.enabled {
            config.keepalive_interval = Some(Duration::from_secs(self.keepalive.interval));
            config.keepalive_max = self.keepalive.max_retries as usize;
        } else {
            config.inactivity_timeout = Some(Duration::from_secs(300));
        }
        config
    }
}
