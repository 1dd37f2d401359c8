// 客户端设置数据结构

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DECISION_TIMEOUT_SECS,
    DEFAULT_KEEPALIVE_INTERVAL_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_USERNAME,
};

/// 客户端设置（持久化用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    // SSH
    pub username: String,
    pub connect_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub decision_timeout_secs: u64,
    // 重试
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            decision_timeout_secs: DEFAULT_DECISION_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
        }
    }
}

impl ClientSettings {
    /// 用户名为空时回退到 root
    pub fn effective_username(&self) -> &str {
        let name = self.username.trim();
        if name.is_empty() {
            DEFAULT_USERNAME
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: ClientSettings = serde_json::from_str(r#"{"username":"deploy"}"#).unwrap();
        assert_eq!(settings.username, "deploy");
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.connect_timeout_secs, 10);
    }

    #[test]
    fn test_blank_username_falls_back_to_root() {
        let settings = ClientSettings {
            username: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.effective_username(), "root");
    }
}
