// Known Hosts 数据模型
// 用于存储和验证 SSH 服务器公钥指纹

use serde::{Deserialize, Serialize};

/// 已知主机条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHost {
    /// 主机标识（端口 22 时为 host，否则为 [host]:port）
    pub host: String,
    /// SHA256 指纹
    pub fingerprint: String,
    /// 首次信任时间
    pub first_seen: String,
    /// 最后使用时间
    pub last_used: String,
}

/// Known Hosts 配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KnownHostsConfig {
    pub hosts: Vec<KnownHost>,
}

impl KnownHostsConfig {
    pub fn find(&self, host: &str) -> Option<&KnownHost> {
        self.hosts.iter().find(|h| h.host == host)
    }

    pub fn find_mut(&mut self, host: &str) -> Option<&mut KnownHost> {
        self.hosts.iter_mut().find(|h| h.host == host)
    }
}
