// SFTP 基础数据类型

use std::cmp::Ordering;

use chrono::{Local, TimeZone};

use super::path::join_path;

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// 普通文件
    #[default]
    File,
    /// 目录
    Directory,
    /// 符号链接
    Symlink,
    /// 其他类型
    Other,
}

/// 远端目录中的一条原始记录（未过滤、未排序）
#[derive(Debug, Clone, Default)]
pub struct DirRecord {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub mtime: u64,
    pub permissions: u32,
}

/// 文件条目
///
/// 排序规则：目录在前，同组内按名称忽略大小写排序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// 文件名
    pub name: String,
    /// 完整路径
    pub path: String,
    /// 文件类型
    pub file_type: FileType,
    /// 文件大小（字节）
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub modified: u64,
    /// Unix 权限（如 0o755）
    pub permissions: u32,
}

impl FileEntry {
    /// 由目录记录生成条目，path 为父目录与名称的拼接
    pub fn from_record(parent: &str, record: DirRecord) -> Self {
        let path = join_path(parent, &record.name);
        Self {
            name: record.name,
            path,
            file_type: record.file_type,
            size: record.size,
            modified: record.mtime,
            permissions: record.permissions,
        }
    }

    /// 是否是目录
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// 是否是隐藏文件（以 . 开头）
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// 获取文件扩展名
    pub fn extension(&self) -> Option<&str> {
        if self.is_dir() {
            return None;
        }
        self.name.rsplit('.').next().filter(|ext| *ext != self.name)
    }

    /// 格式化文件大小
    pub fn format_size(&self) -> String {
        if self.is_dir() {
            return String::new();
        }

        let size = self.size as f64;
        if size >= 1_073_741_824.0 {
            format!("{:.1} GB", size / 1_073_741_824.0)
        } else if size >= 1_048_576.0 {
            format!("{:.1} MB", size / 1_048_576.0)
        } else if size >= 1_024.0 {
            format!("{:.1} KB", size / 1_024.0)
        } else {
            format!("{} B", self.size)
        }
    }

    /// 格式化修改时间（如 "Mar 05 14:30"，本地时区）
    pub fn format_modified(&self) -> String {
        Local
            .timestamp_opt(self.modified as i64, 0)
            .single()
            .map(|t| t.format("%b %d %H:%M").to_string())
            .unwrap_or_default()
    }

    /// 格式化权限字符串（如 drwxr-xr-x）
    pub fn format_permissions(&self) -> String {
        let perms = self.permissions;
        let mut s = String::with_capacity(10);

        s.push(match self.file_type {
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
            _ => '-',
        });

        for shift in [6, 3, 0] {
            let bits = (perms >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }

        s
    }
}

impl Ord for FileEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .is_dir()
            .cmp(&self.is_dir())
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for FileEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 把原始目录记录转换为有序的文件列表，去掉 . 和 ..
pub fn list_entries(parent: &str, records: Vec<DirRecord>) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = records
        .into_iter()
        .filter(|r| r.name != "." && r.name != "..")
        .map(|r| FileEntry::from_record(parent, r))
        .collect();
    entries.sort();
    entries
}
