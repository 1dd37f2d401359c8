// 文件传输通道抽象
//
// 连接池只关心两件事：如何建立一个到目标主机的文件通道，以及通道是否还活着。
// 真实实现见 services::sftp（russh + russh-sftp）。

use std::sync::Arc;

use async_trait::async_trait;

use super::config::SshConfig;
use super::error::SshError;
use crate::models::DirRecord;

/// 已建立的文件通道（连接池中共享）
pub type SftpChannel = Arc<dyn RemoteFs>;

/// 远程文件系统操作
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 底层会话与通道是否仍可用
    fn is_alive(&self) -> bool;

    /// 读取目录原始记录
    async fn read_dir(&self, path: &str) -> Result<Vec<DirRecord>, SshError>;

    /// 读取整个文件
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SshError>;

    /// 获取文件大小（字节）
    async fn stat_size(&self, path: &str) -> Result<u64, SshError>;

    /// 关闭通道与会话
    async fn close(&self);
}

/// 建立新的文件通道（包含连接、握手、主机密钥校验、认证与打开子系统）
#[async_trait]
pub trait SftpConnector: Send + Sync {
    async fn connect(&self, config: &SshConfig) -> Result<SftpChannel, SshError>;
}

/// 两个通道是否是同一个
pub fn same_channel(a: &SftpChannel, b: &SftpChannel) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的假连接器与假文件系统

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::models::FileType;

    /// 内存中的远程文件系统
    #[derive(Default)]
    pub struct FakeFs {
        alive: AtomicBool,
        closed: AtomicBool,
        entries: Vec<DirRecord>,
        files: HashMap<String, Vec<u8>>,
        failures: Mutex<VecDeque<SshError>>,
        /// 所有操作都以断线失败
        broken: bool,
    }

    impl FakeFs {
        pub fn new() -> Self {
            Self {
                alive: AtomicBool::new(true),
                ..Default::default()
            }
        }

        pub fn with_entry(mut self, name: &str, file_type: FileType) -> Self {
            self.entries.push(DirRecord {
                name: name.to_string(),
                file_type,
                ..Default::default()
            });
            self
        }

        pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
            self.files.insert(path.to_string(), content.to_vec());
            self
        }

        /// 下一次操作返回指定错误
        pub fn fail_next(self, err: SshError) -> Self {
            self.failures.lock().unwrap().push_back(err);
            self
        }

        pub fn broken(mut self) -> Self {
            self.broken = true;
            self
        }

        /// 模拟连接在池中静默断开
        pub fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<(), SshError> {
            if self.broken {
                return Err(SshError::Disconnected("connection reset".into()));
            }
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn file(&self, op: &'static str, path: &str) -> Result<&Vec<u8>, SshError> {
            self.files.get(path).ok_or_else(|| SshError::Remote {
                op,
                path: path.to_string(),
                message: "No such file".to_string(),
            })
        }
    }

    #[async_trait]
    impl RemoteFs for FakeFs {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst) && !self.is_closed()
        }

        async fn read_dir(&self, _path: &str) -> Result<Vec<DirRecord>, SshError> {
            self.check()?;
            Ok(self.entries.clone())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>, SshError> {
            self.check()?;
            self.file("read", path).cloned()
        }

        async fn stat_size(&self, path: &str) -> Result<u64, SshError> {
            self.check()?;
            self.file("stat", path).map(|content| content.len() as u64)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    type Factory = Box<dyn Fn(usize) -> Result<FakeFs, SshError> + Send + Sync>;

    /// 计数的假连接器，第 n 次连接的结果由 factory(n) 决定
    pub struct FakeConnector {
        factory: Factory,
        delay: Duration,
        connects: AtomicUsize,
        opened: Mutex<Vec<Arc<FakeFs>>>,
    }

    impl FakeConnector {
        pub fn new(factory: impl Fn(usize) -> Result<FakeFs, SshError> + Send + Sync + 'static) -> Self {
            Self {
                factory: Box::new(factory),
                delay: Duration::ZERO,
                connects: AtomicUsize::new(0),
                opened: Mutex::new(Vec::new()),
            }
        }

        /// 每次连接都成功，返回空目录
        pub fn healthy() -> Self {
            Self::new(|_| Ok(FakeFs::new()))
        }

        /// 模拟握手耗时
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn opened(&self) -> Vec<Arc<FakeFs>> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SftpConnector for FakeConnector {
        async fn connect(&self, _config: &SshConfig) -> Result<SftpChannel, SshError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let fs = Arc::new((self.factory)(n)?);
            self.opened.lock().unwrap().push(fs.clone());
            Ok(fs as SftpChannel)
        }
    }
}
