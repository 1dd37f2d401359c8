// 远程文件访问服务
//
// 每个操作都在工作运行时上独立执行：从连接池取通道，执行一次 SFTP 请求；
// 传输类失败时丢弃该通道并按退避策略重试，直到成功或次数耗尽。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tracing::debug;

use crate::models::sftp::{list_entries, FileEntry};
use crate::ssh::channel::SftpChannel;
use crate::ssh::error::SshError;
use crate::ssh::pool::ConnectionPool;
use crate::ssh::reconnect::RetryPolicy;

/// 创建执行文件操作的多线程运行时
pub fn worker_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sftp-worker")
        .build()
}

/// 尚未完成的操作结果
///
/// 在任意执行器上 await 即可取得结果；提前丢弃不会中断后台任务
pub struct PendingResult<T> {
    rx: oneshot::Receiver<Result<T, SshError>>,
}

impl<T> Future for PendingResult<T> {
    type Output = Result<T, SshError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SshError::Cancelled)))
    }
}

struct Inner {
    pool: Arc<ConnectionPool>,
    policy: RetryPolicy,
}

impl Inner {
    /// 取通道执行一次操作；传输类失败时把通道从池中丢弃
    async fn with_channel<T, F, Fut>(&self, host: &str, port: u16, op: F) -> Result<T, SshError>
    where
        F: FnOnce(SftpChannel) -> Fut,
        Fut: Future<Output = Result<T, SshError>>,
    {
        let channel = self.pool.acquire(host, port).await?;
        match op(channel.clone()).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_retryable() {
                    self.pool.discard(host, port, &channel).await;
                }
                Err(e)
            }
        }
    }

    async fn list(&self, host: &str, port: u16, path: &str) -> Result<Vec<FileEntry>, SshError> {
        let records = self
            .policy
            .run("list", path, move |_| {
                self.with_channel(host, port, move |ch| async move { ch.read_dir(path).await })
            })
            .await?;
        Ok(list_entries(path, records))
    }

    async fn read(&self, host: &str, port: u16, path: &str) -> Result<Vec<u8>, SshError> {
        self.policy
            .run("read", path, move |_| {
                self.with_channel(host, port, move |ch| async move { ch.read_file(path).await })
            })
            .await
    }

    async fn stat(&self, host: &str, port: u16, path: &str) -> Result<u64, SshError> {
        self.policy
            .run("stat", path, move |_| {
                self.with_channel(host, port, move |ch| async move { ch.stat_size(path).await })
            })
            .await
    }
}

/// 远程文件访问服务
#[derive(Clone)]
pub struct FileAccessService {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl FileAccessService {
    /// runtime 为执行操作的运行时（通常来自 worker_runtime()）
    pub fn new(pool: Arc<ConnectionPool>, policy: RetryPolicy, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner { pool, policy }),
            runtime,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.inner.pool
    }

    fn spawn<T, F, Fut>(&self, f: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: Future<Output = Result<T, SshError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = f(self.inner.clone());
        self.runtime.spawn(async move {
            // 调用方可能已放弃等待
            let _ = tx.send(task.await);
        });
        PendingResult { rx }
    }

    /// 列出目录：去掉 . 与 ..，目录在前，按名称忽略大小写排序
    pub fn list(&self, host: &str, port: u16, path: &str) -> PendingResult<Vec<FileEntry>> {
        debug!("[SFTP] list {}:{} {}", host, port, path);
        let (host, path) = (host.to_string(), path.to_string());
        self.spawn(move |inner| async move { inner.list(&host, port, &path).await })
    }

    /// 读取整个文件
    pub fn read(&self, host: &str, port: u16, path: &str) -> PendingResult<Vec<u8>> {
        debug!("[SFTP] read {}:{} {}", host, port, path);
        let (host, path) = (host.to_string(), path.to_string());
        self.spawn(move |inner| async move { inner.read(&host, port, &path).await })
    }

    /// 获取文件大小（字节）
    pub fn stat(&self, host: &str, port: u16, path: &str) -> PendingResult<u64> {
        debug!("[SFTP] stat {}:{} {}", host, port, path);
        let (host, path) = (host.to_string(), path.to_string());
        self.spawn(move |inner| async move { inner.stat(&host, port, &path).await })
    }

    /// 断开到指定目标的连接
    pub fn disconnect(&self, host: &str, port: u16) -> PendingResult<()> {
        let host = host.to_string();
        self.spawn(move |inner| async move {
            inner.pool.release(&host, port).await;
            Ok(())
        })
    }

    /// 断开所有连接
    pub fn shutdown(&self) -> PendingResult<()> {
        self.spawn(|inner| async move {
            inner.pool.release_all().await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientSettings, FileType};
    use crate::ssh::channel::testing::{FakeConnector, FakeFs};
    use std::time::Duration;
    use tokio::time::Instant;

    fn service(connector: Arc<FakeConnector>) -> FileAccessService {
        let pool = Arc::new(ConnectionPool::new(connector, ClientSettings::default()));
        FileAccessService::new(pool, RetryPolicy::default(), Handle::current())
    }

    fn listing() -> FakeFs {
        FakeFs::new()
            .with_entry(".", FileType::Directory)
            .with_entry("..", FileType::Directory)
            .with_entry("b.txt", FileType::File)
            .with_entry("A", FileType::Directory)
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_filters_and_sorts() {
        let connector = Arc::new(FakeConnector::new(|_| Ok(listing())));
        let svc = service(connector);

        let entries = svc.list("h", 22, "/srv").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["A", "b.txt"]);
        assert_eq!(entries[0].path, "/srv/A");
        assert!(entries[0].is_dir());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_on_fresh_connection() {
        let connector = Arc::new(FakeConnector::new(|n| {
            if n == 0 {
                Ok(listing().fail_next(SshError::Disconnected("connection reset".into())))
            } else {
                Ok(listing())
            }
        }));
        let svc = service(connector.clone());
        let start = Instant::now();

        let entries = svc.list("h", 22, "/srv").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(connector.connects(), 2);
        assert!(connector.opened()[0].is_closed());
        assert!(!connector.opened()[1].is_closed());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_exhausts_retries() {
        let connector = Arc::new(FakeConnector::new(|_| Ok(FakeFs::new().broken())));
        let svc = service(connector.clone());
        let start = Instant::now();

        let err = svc.list("h", 22, "/srv").await.unwrap_err();

        match err {
            SshError::ExhaustedRetries {
                op,
                path,
                attempts,
                source,
            } => {
                assert_eq!(op, "list");
                assert_eq!(path, "/srv");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, SshError::Disconnected(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(connector.connects(), 3);
        assert_eq!(svc.pool().pooled_count().await, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_count_as_attempts() {
        let connector = Arc::new(FakeConnector::new(|_| Err(SshError::Timeout(10))));
        let svc = service(connector.clone());

        let err = svc.stat("h", 22, "/x").await.unwrap_err();

        assert!(matches!(err, SshError::ExhaustedRetries { attempts: 3, .. }));
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_is_not_retried() {
        let connector = Arc::new(FakeConnector::healthy());
        let svc = service(connector.clone());

        let err = svc.stat("h", 22, "/missing").await.unwrap_err();

        assert!(matches!(err, SshError::Remote { op: "stat", .. }));
        assert_eq!(connector.connects(), 1);
        // 协议错误不影响连接本身
        assert!(svc.pool().is_pooled("h", 22).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_surfaces_immediately() {
        let connector = Arc::new(FakeConnector::new(|_| Err(SshError::NoIdentity)));
        let svc = service(connector.clone());

        let err = svc.read("h", 22, "/etc/motd").await.unwrap_err();

        assert!(matches!(err, SshError::NoIdentity));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_and_stat_share_connection() {
        let connector = Arc::new(FakeConnector::new(|_| {
            Ok(FakeFs::new().with_file("/etc/motd", b"hi\n"))
        }));
        let svc = service(connector.clone());

        assert_eq!(svc.read("h", 22, "/etc/motd").await.unwrap(), b"hi\n");
        assert_eq!(svc.stat("h", 22, "/etc/motd").await.unwrap(), 3);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_result_still_completes() {
        let connector = Arc::new(FakeConnector::healthy().with_delay(Duration::from_secs(1)));
        let svc = service(connector.clone());

        drop(svc.list("h", 22, "/"));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(connector.connects(), 1);
        assert!(svc.pool().is_pooled("h", 22).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_and_shutdown() {
        let connector = Arc::new(FakeConnector::healthy());
        let svc = service(connector.clone());

        svc.list("a", 22, "/").await.unwrap();
        svc.list("b", 2222, "/").await.unwrap();

        svc.disconnect("a", 22).await.unwrap();
        assert!(!svc.pool().is_pooled("a", 22).await);
        assert!(svc.pool().is_pooled("b", 2222).await);

        svc.shutdown().await.unwrap();
        assert_eq!(svc.pool().pooled_count().await, 0);
        assert!(connector.opened().iter().all(|fs| fs.is_closed()));
    }
}
