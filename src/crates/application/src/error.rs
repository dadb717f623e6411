use domain::resolver::ResolveError;
use domain::transcoding::TranscodeError;
use domain::value::ChatId;
use domain::voice_call::VoiceCallError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Resolution failure: {0}")]
    Resolution(#[from] ResolveError),
    #[error("No active group call in chat {0}")]
    NoActiveCall(ChatId),
    #[error("Assistant already joined chat {0}")]
    AlreadyJoined(ChatId),
    #[error("Voice call driver error (retryable): {0}")]
    DriverTransient(String),
    #[error("Voice call driver error (fatal): {0}")]
    DriverFatal(String),
    #[error("Stale state: {0}")]
    StaleState(String),
    #[error("Chat {0} is not joined")]
    NotJoined(ChatId),
    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),
}

impl AppError {
    /// 驱动错误的默认归类：服务器错误可重试，其余视为致命
    pub fn from_driver(chat_id: ChatId, err: VoiceCallError) -> Self {
        match err {
            VoiceCallError::NoActiveCall => AppError::NoActiveCall(chat_id),
            VoiceCallError::AlreadyJoined => AppError::AlreadyJoined(chat_id),
            VoiceCallError::ServerError(msg) => AppError::DriverTransient(msg),
            VoiceCallError::CallNotFound => AppError::NotJoined(chat_id),
            VoiceCallError::Other(msg) => AppError::DriverFatal(msg),
        }
    }
}
