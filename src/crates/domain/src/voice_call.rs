use crate::stream::StreamDescriptor;
use crate::value::{AccountId, ChatId, ParticipantId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceCallError {
    #[error("no active group call in chat")]
    NoActiveCall,
    #[error("assistant already joined the group call")]
    AlreadyJoined,
    #[error("telegram server error: {0}")]
    ServerError(String),
    #[error("group call not found")]
    CallNotFound,
    #[error("{0}")]
    Other(String),
}

/// 多账号语音通话客户端，所有操作按 (账号, 会话) 寻址
#[async_trait]
pub trait VoiceCallDriver: Send + Sync {
    async fn join(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError>;

    async fn change_stream(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError>;

    /// 未加入时返回 `CallNotFound`，调用方按成功处理
    async fn leave(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError>;

    async fn pause(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError>;

    async fn resume(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError>;

    async fn mute(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError>;

    async fn unmute(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError>;

    async fn participants(
        &self,
        account: AccountId,
        chat_id: ChatId,
    ) -> Result<Vec<ParticipantId>, VoiceCallError>;

    /// 账号与服务器之间的往返延迟（毫秒）
    async fn ping(&self, account: AccountId) -> Result<f64, VoiceCallError>;
}

/// 结束推流的轨道类型，只有音频轨结束才代表曲目播放完毕
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndedTrack {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    StreamEnded(EndedTrack),
    Left,
    Kicked,
    CallClosed,
}

impl CallEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventKind::StreamEnded(EndedTrack::Audio) => "stream_ended",
            CallEventKind::StreamEnded(EndedTrack::Video) => "video_ended",
            CallEventKind::Left => "left",
            CallEventKind::Kicked => "kicked",
            CallEventKind::CallClosed => "call_closed",
        }
    }
}

/// 驱动异步上报的通话生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub account: AccountId,
    pub chat_id: ChatId,
    pub kind: CallEventKind,
}
