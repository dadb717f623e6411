use application::shared::{retry, RetryPolicy};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("write failed: {0}")]
    Io(String),
}

impl FetchError {
    /// 5xx 与网络错误可重试，4xx 与本地写入错误直接失败
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Request(_) => true,
            FetchError::Io(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => FetchError::Request(e.to_string()),
        }
    }
}

/// 直链媒体下载，流式写盘，失败按指数退避重试
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, attempts: u32, backoff: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let policy = RetryPolicy::exponential(attempts, backoff, backoff.saturating_mul(16))
            .with_jitter();
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 下载 `url` 到 `dest`，返回写入的字节数
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let label = format!("fetch {}", url);
        retry(
            &self.policy,
            &label,
            |_| self.fetch_once(url, dest),
            FetchError::is_retryable,
        )
        .await
    }

    async fn fetch_once(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FetchError::Io(format!("create {:?}: {}", dir, e)))?;
        }
        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| FetchError::Io(format!("create {:?}: {}", partial, e)))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| FetchError::Io(format!("rename {:?}: {}", partial, e)))?;
        log::info!("[Fetch] {} -> {:?} ({} bytes)", url, dest, written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;

    fn fetcher(attempts: u32) -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), attempts, Duration::from_millis(5)).unwrap()
    }

    #[test]
    fn test_retry_classification() {
        let server = FetchError::Status {
            status: 503,
            url: "u".into(),
        };
        let client = FetchError::Status {
            status: 404,
            url: "u".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(FetchError::Request("reset".into()).is_retryable());
        assert!(!FetchError::Io("disk full".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let server = serve(vec![(503, "busy"), (200, "audio-bytes")]).await;
        let url = format!("{}/track.mp3", server.base_url);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cache").join("track.mp3");

        let written = fetcher(3).fetch_to_file(&url, &dest).await.unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "audio-bytes");
        assert_eq!(server.hits(), 2);
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = serve(vec![(404, "missing"), (200, "never")]).await;
        let url = format!("{}/track.mp3", server.base_url);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.mp3");

        let err = fetcher(3).fetch_to_file(&url, &dest).await.unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(server.hits(), 1);
        assert!(!dest.exists());
    }
}
