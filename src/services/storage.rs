// 本地数据持久化服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{files, APP_DIR_NAME};
use crate::models::{ClientSettings, KnownHostsConfig};

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/sftp-access
/// Linux: ~/.config/sftp-access
/// Windows: C:\Users\<用户名>\AppData\Roaming\sftp-access
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join(APP_DIR_NAME);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

/// 获取密钥目录路径
pub fn get_keys_dir() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(files::KEYS_DIR))
}

/// 获取 Known Hosts 文件路径
pub fn get_known_hosts_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(files::KNOWN_HOSTS))
}

/// 获取设置配置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(files::SETTINGS))
}

// ======================== Settings 配置持久化 ========================

/// 加载客户端设置
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from(&get_settings_file()?)
}

/// 从指定路径加载客户端设置，文件不存在时返回默认值
pub fn load_settings_from(path: &Path) -> Result<ClientSettings> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }
    let content = fs::read_to_string(path).context("无法读取设置配置文件")?;
    let settings: ClientSettings =
        serde_json::from_str(&content).context("无法解析设置配置文件")?;
    Ok(settings)
}

/// 保存客户端设置
pub fn save_settings(settings: &ClientSettings) -> Result<()> {
    let path = get_settings_file()?;
    let content = serde_json::to_string_pretty(settings).context("无法序列化设置配置")?;
    fs::write(&path, content).context("无法写入设置配置文件")?;
    Ok(())
}

// ======================== Known Hosts 持久化 ========================

/// 加载 Known Hosts，文件不存在时返回空配置
pub fn load_known_hosts_from(path: &Path) -> Result<KnownHostsConfig> {
    if !path.exists() {
        return Ok(KnownHostsConfig::default());
    }
    let content = fs::read_to_string(path).context("无法读取 Known Hosts 文件")?;
    let config: KnownHostsConfig =
        serde_json::from_str(&content).context("无法解析 Known Hosts 文件")?;
    Ok(config)
}

/// 保存 Known Hosts
pub fn save_known_hosts_to(path: &Path, config: &KnownHostsConfig) -> Result<()> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(config).context("无法序列化 Known Hosts")?;
    write_replace(path, content.as_bytes(), false).context("无法写入 Known Hosts 文件")?;
    Ok(())
}

// ======================== 密钥文件 ========================

/// 写入密钥对：两个临时文件都写好后再依次替换
///
/// 临时文件写入失败时旧密钥对保持不变；替换公钥失败时删除新私钥，
/// 不留下互不匹配的一对
pub fn write_key_pair(
    private_path: &Path,
    private: &[u8],
    public_path: &Path,
    public: &[u8],
) -> Result<()> {
    ensure_parent(private_path)?;
    ensure_parent(public_path)?;

    let private_tmp = write_tmp(private_path, private, true)
        .with_context(|| format!("无法写入文件 {}", private_path.display()))?;
    let public_tmp = match write_tmp(public_path, public, false) {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = fs::remove_file(&private_tmp);
            return Err(e).with_context(|| format!("无法写入文件 {}", public_path.display()));
        }
    };

    if let Err(e) = fs::rename(&private_tmp, private_path) {
        let _ = fs::remove_file(&private_tmp);
        let _ = fs::remove_file(&public_tmp);
        return Err(e).with_context(|| format!("无法替换文件 {}", private_path.display()));
    }
    if let Err(e) = fs::rename(&public_tmp, public_path) {
        let _ = fs::remove_file(&public_tmp);
        let _ = fs::remove_file(private_path);
        return Err(e).with_context(|| format!("无法替换文件 {}", public_path.display()));
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录 {}", parent.display()))?;
        }
    }
    Ok(())
}

/// 先写临时文件再重命名，避免中途失败留下半个文件
fn write_replace(path: &Path, content: &[u8], private: bool) -> std::io::Result<()> {
    let tmp = write_tmp(path, content, private)?;
    fs::rename(&tmp, path)
}

/// 写入 <path>.tmp 并落盘，返回临时文件路径
fn write_tmp(path: &Path, content: &[u8], private: bool) -> std::io::Result<PathBuf> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if private {
                options.mode(0o600);
            }
        }
        #[cfg(not(unix))]
        let _ = private;

        use std::io::Write;
        let mut file = options.open(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    Ok(tmp)
}
