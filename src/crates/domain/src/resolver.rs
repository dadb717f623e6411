use crate::queue::{ExternalId, SourceKind};
use async_trait::async_trait;
use thiserror::Error;

/// 解析/下载失败。需要在合并的并发请求之间共享，因此可 Clone。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("未找到: {0}")]
    NotFound(String),
    #[error("下载失败: {0}")]
    Download(String),
    #[error("服务不可用: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail: Option<String>,
    pub external_id: ExternalId,
    /// 原始页面链接
    pub link: String,
    pub is_live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub metadata: TrackMetadata,
    pub source_kind: SourceKind,
    pub locator: String,
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// 搜索词或链接解析为元数据与可播放的 locator
    async fn resolve(&self, query: &str, want_video: bool) -> Result<ResolvedTrack, ResolveError>;

    /// 直播源的直链
    async fn live_url(&self, video_id: &str, want_video: bool) -> Result<String, ResolveError>;

    /// 下载到本地并返回文件路径
    async fn download(&self, video_id: &str, want_video: bool) -> Result<String, ResolveError>;

    async fn thumbnail(&self, video_id: &str) -> Result<String, ResolveError>;
}
