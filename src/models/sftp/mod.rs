// SFTP 数据模型

pub mod path;
pub mod types;

pub use path::join_path;
pub use types::{list_entries, DirRecord, FileEntry, FileType};
