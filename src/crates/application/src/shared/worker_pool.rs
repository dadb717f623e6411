use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_HEAVY_JOBS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerPoolError {
    #[error("worker pool closed")]
    Closed,
    #[error("worker panicked: {0}")]
    Join(String),
}

/// 重任务（下载、转码、探测）的并发上限，避免占满调度器
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// 占用一个名额执行异步任务（如子进程）
    pub async fn run<F, T>(&self, fut: F) -> Result<T, WorkerPoolError>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerPoolError::Closed)?;
        Ok(fut.await)
    }

    /// 占用一个名额，在阻塞线程池上执行同步任务
    pub async fn run_blocking<F, T>(&self, job: F) -> Result<T, WorkerPoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerPoolError::Closed)?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| WorkerPoolError::Join(e.to_string()))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAVY_JOBS)
    }
}
