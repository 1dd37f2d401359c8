// 全局常量

/// 配置目录名
pub const APP_DIR_NAME: &str = "sftp-access";

/// 未配置用户名时使用的默认用户
pub const DEFAULT_USERNAME: &str = "root";

/// 连接建立超时（秒）
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// 心跳间隔（秒）
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// 等待用户确认主机密钥的超时（秒）
pub const DEFAULT_DECISION_TIMEOUT_SECS: u64 = 60;

/// 每个操作的最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 退避基数（秒），第 n 次失败后等待 base^n 秒
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;

/// 读取远程文件时的分块大小
pub const READ_CHUNK_SIZE: usize = 8192;

/// 持久化文件名
pub mod files {
    pub const SETTINGS: &str = "settings.json";
    pub const KNOWN_HOSTS: &str = "known_hosts.json";
    pub const KEYS_DIR: &str = "keys";
    pub const PRIVATE_KEY: &str = "id_ed25519";
    pub const PUBLIC_KEY: &str = "id_ed25519.pub";
}
