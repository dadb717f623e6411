use crate::error::AppError;
use crate::playback::controller::{PlayOutcome, PlaybackController};
use domain::queue::QueueEntry;
use domain::stream::StreamType;
use domain::value::ChatId;
use log::info;

/// 一次播放命令
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// 搜索词或链接
    pub query: String,
    pub video: bool,
    pub requested_by: String,
    /// 发起命令的会话，提示与卡片发到这里
    pub origin_chat_id: ChatId,
}

impl PlaybackController {
    /// 解析查询并入队
    pub async fn play(&self, chat_id: ChatId, request: PlayRequest) -> Result<PlayOutcome, AppError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("empty query".to_string()));
        }
        let track = self.resolver.resolve(query, request.video).await?;
        info!(
            "[Play] chat {} resolved \"{}\" to {} ({})",
            chat_id,
            query,
            track.metadata.title,
            track.source_kind.as_str()
        );

        let entry = QueueEntry::new(
            track.source_kind,
            track.locator,
            track.metadata.title,
            request.requested_by,
            request.origin_chat_id,
            StreamType::from_video_flag(request.video),
            track.metadata.duration_seconds,
            track.metadata.external_id,
        );
        self.ensure_playing(chat_id, entry).await
    }
}
