// 数据模型模块

pub mod known_hosts;
pub mod settings;
pub mod sftp;

pub use known_hosts::{KnownHost, KnownHostsConfig};
pub use settings::ClientSettings;
pub use sftp::{DirRecord, FileEntry, FileType};
