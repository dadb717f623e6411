use crate::speed::PlaybackSpeed;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscodeError {
    #[error("源文件不存在: {0}")]
    SourceMissing(String),
    #[error("转码失败: {0}")]
    Failed(String),
    #[error("时长探测失败: {0}")]
    Probe(String),
}

/// 生成倍速副本并探测时长
#[async_trait]
pub trait SpeedTranscoder: Send + Sync {
    /// 返回 `source` 在 `speed` 倍速下的副本路径，已存在时直接复用
    async fn speed_copy(&self, source: &str, speed: PlaybackSpeed) -> Result<String, TranscodeError>;

    /// 媒体时长（秒）
    async fn probe_duration(&self, path: &str) -> Result<u64, TranscodeError>;
}
