use crate::stream::StreamType;
use crate::value::{ChatId, MessageId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("消息发送失败: {0}")]
    SendFailed(String),
}

/// 面向用户的提示。文案与本地化由消息端负责，这里只传递语义。
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// 目标会话没有进行中的语音聊天
    NoActiveCall,
    /// 加入语音聊天时服务器出错
    JoinServerError,
    /// 加入失败（其他原因）
    JoinFailed,
    /// 换曲失败，播放已停止
    StreamFailed,
    /// 助手不在语音聊天中，需要手动重新加入
    NotInCall,
    SkipFailed,
    SeekFailed,
    /// 正在下载下一首
    Downloading,
    /// 状态已重置，请重新播放
    StateReset,
    /// 状态重置失败
    ResetFailed,
    /// 语音聊天无人收听，已自动退出
    AutoEnded,
}

impl Notice {
    pub fn key(&self) -> &'static str {
        match self {
            Notice::NoActiveCall => "no_active_call",
            Notice::JoinServerError => "join_server_error",
            Notice::JoinFailed => "join_failed",
            Notice::StreamFailed => "stream_failed",
            Notice::NotInCall => "not_in_call",
            Notice::SkipFailed => "skip_failed",
            Notice::SeekFailed => "seek_failed",
            Notice::Downloading => "downloading",
            Notice::StateReset => "state_reset",
            Notice::ResetFailed => "reset_failed",
            Notice::AutoEnded => "auto_ended",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NowPlayingLink {
    /// 机器人深链，查看曲目详情
    DeepLink(String),
    /// 支持群链接（电报文件、SoundCloud 等无详情页的来源）
    SupportChat(String),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingCard {
    /// 语音聊天所在会话，用于生成控制按钮
    pub chat_id: ChatId,
    pub title: String,
    pub duration_display: String,
    pub requested_by: String,
    pub link: NowPlayingLink,
    pub artwork: String,
    pub stream_type: StreamType,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: ChatId, notice: Notice) -> Result<MessageId, NotifyError>;

    async fn now_playing(
        &self,
        chat_id: ChatId,
        card: &NowPlayingCard,
    ) -> Result<MessageId, NotifyError>;

    async fn delete(&self, chat_id: ChatId, message: MessageId) -> Result<(), NotifyError>;
}
