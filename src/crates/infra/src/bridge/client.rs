use async_trait::async_trait;
use domain::notifier::{Notice, Notifier, NotifyError, NowPlayingCard, NowPlayingLink};
use domain::stream::StreamDescriptor;
use domain::value::{AccountId, ChatId, MessageId, ParticipantId};
use domain::voice_call::{VoiceCallDriver, VoiceCallError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 桥接服务返回的错误体
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct StreamBody<'a> {
    locator: &'a str,
    audio_quality: &'static str,
    video_quality: Option<&'static str>,
    /// ffmpeg 输入参数，例如 `-ss 00:01:00 -to 00:03:00`
    ffmpeg_parameters: Option<String>,
}

impl<'a> From<&'a StreamDescriptor> for StreamBody<'a> {
    fn from(stream: &'a StreamDescriptor) -> Self {
        Self {
            locator: &stream.locator,
            audio_quality: "high",
            video_quality: stream.video_quality.map(|_| "sd_480p"),
            ffmpeg_parameters: stream.ffmpeg_parameters(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NoticeBody {
    notice: &'static str,
}

#[derive(Debug, Serialize)]
struct CardBody<'a> {
    voice_chat_id: i64,
    title: &'a str,
    duration: &'a str,
    requested_by: &'a str,
    link: Option<&'a str>,
    /// "deep_link" / "support_chat"
    link_kind: Option<&'static str>,
    artwork: &'a str,
    stream_type: &'static str,
}

impl<'a> From<&'a NowPlayingCard> for CardBody<'a> {
    fn from(card: &'a NowPlayingCard) -> Self {
        let (link, link_kind) = match &card.link {
            NowPlayingLink::DeepLink(url) => (Some(url.as_str()), Some("deep_link")),
            NowPlayingLink::SupportChat(url) => (Some(url.as_str()), Some("support_chat")),
            NowPlayingLink::None => (None, None),
        };
        Self {
            voice_chat_id: card.chat_id.as_i64(),
            title: &card.title,
            duration: &card.duration_display,
            requested_by: &card.requested_by,
            link,
            link_kind,
            artwork: &card.artwork,
            stream_type: card.stream_type.as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageSent {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Participants {
    participants: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct Ping {
    ping_ms: f64,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// 桥接服务错误码到语音驱动错误的映射
fn call_error(status: u16, body: &str) -> VoiceCallError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => match err.error.as_str() {
            "no_active_call" => VoiceCallError::NoActiveCall,
            "already_joined" => VoiceCallError::AlreadyJoined,
            "server_error" => VoiceCallError::ServerError(err.message),
            "call_not_found" | "not_in_call" => VoiceCallError::CallNotFound,
            other => VoiceCallError::Other(format!("{}: {}", other, err.message)),
        },
        Err(_) if status >= 500 => VoiceCallError::ServerError(format!("HTTP {}", status)),
        Err(_) => VoiceCallError::Other(format!("HTTP {}: {}", status, body)),
    }
}

#[derive(Debug)]
enum BridgeFailure {
    /// 桥接服务明确返回的错误
    Rejected { status: u16, body: String },
    Transport(String),
}

impl BridgeFailure {
    fn into_call_error(self) -> VoiceCallError {
        match self {
            BridgeFailure::Rejected { status, body } => call_error(status, &body),
            BridgeFailure::Transport(msg) => VoiceCallError::Other(msg),
        }
    }

    fn into_notify_error(self) -> NotifyError {
        match self {
            BridgeFailure::Rejected { status, body } => {
                NotifyError::SendFailed(format!("HTTP {}: {}", status, body))
            }
            BridgeFailure::Transport(msg) => NotifyError::SendFailed(msg),
        }
    }
}

/// 语音桥接服务的 HTTP 客户端。
///
/// 桥接服务持有各助手账号的会话并负责实际推流，同时代发群消息；
/// 通话生命周期事件由它回调 `POST /api/events`。
#[derive(Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BridgeClient {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn call_url(&self, account: AccountId, chat_id: ChatId, action: &str) -> String {
        format!(
            "{}/accounts/{}/calls/{}/{}",
            self.base_url, account, chat_id, action
        )
    }

    fn chat_url(&self, chat_id: ChatId, tail: &str) -> String {
        format!("{}/chats/{}/{}", self.base_url, chat_id, tail)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BridgeFailure> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| BridgeFailure::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BridgeFailure::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(BridgeFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body)
            .map_err(|e| BridgeFailure::Transport(format!("bad bridge response: {}", e)))
    }

    async fn call_action(
        &self,
        account: AccountId,
        chat_id: ChatId,
        action: &str,
        stream: Option<&StreamDescriptor>,
    ) -> Result<(), VoiceCallError> {
        let mut request = self.client.post(self.call_url(account, chat_id, action));
        if let Some(stream) = stream {
            request = request.json(&StreamBody::from(stream));
        }
        self.send::<Empty>(request)
            .await
            .map(|_| ())
            .map_err(|e| {
                let err = e.into_call_error();
                log::debug!("[Bridge] {} chat {} via {}: {}", action, chat_id, account, err);
                err
            })
    }
}

#[async_trait]
impl VoiceCallDriver for BridgeClient {
    async fn join(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "join", Some(stream)).await
    }

    async fn change_stream(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "change_stream", Some(stream))
            .await
    }

    async fn leave(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "leave", None).await
    }

    async fn pause(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "pause", None).await
    }

    async fn resume(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "resume", None).await
    }

    async fn mute(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "mute", None).await
    }

    async fn unmute(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.call_action(account, chat_id, "unmute", None).await
    }

    async fn participants(
        &self,
        account: AccountId,
        chat_id: ChatId,
    ) -> Result<Vec<ParticipantId>, VoiceCallError> {
        let request = self
            .client
            .get(self.call_url(account, chat_id, "participants"));
        let body: Participants = self
            .send(request)
            .await
            .map_err(BridgeFailure::into_call_error)?;
        Ok(body.participants.into_iter().map(ParticipantId::from).collect())
    }

    async fn ping(&self, account: AccountId) -> Result<f64, VoiceCallError> {
        let request = self
            .client
            .get(format!("{}/accounts/{}/ping", self.base_url, account));
        let body: Ping = self
            .send(request)
            .await
            .map_err(BridgeFailure::into_call_error)?;
        Ok(body.ping_ms)
    }
}

#[async_trait]
impl Notifier for BridgeClient {
    async fn notify(&self, chat_id: ChatId, notice: Notice) -> Result<MessageId, NotifyError> {
        let request = self
            .client
            .post(self.chat_url(chat_id, "notices"))
            .json(&NoticeBody {
                notice: notice.key(),
            });
        let sent: MessageSent = self
            .send(request)
            .await
            .map_err(BridgeFailure::into_notify_error)?;
        Ok(MessageId::from(sent.message_id))
    }

    async fn now_playing(
        &self,
        chat_id: ChatId,
        card: &NowPlayingCard,
    ) -> Result<MessageId, NotifyError> {
        let request = self
            .client
            .post(self.chat_url(chat_id, "now_playing"))
            .json(&CardBody::from(card));
        let sent: MessageSent = self
            .send(request)
            .await
            .map_err(BridgeFailure::into_notify_error)?;
        Ok(MessageId::from(sent.message_id))
    }

    async fn delete(&self, chat_id: ChatId, message: MessageId) -> Result<(), NotifyError> {
        let request = self
            .client
            .delete(self.chat_url(chat_id, &format!("messages/{}", message)));
        self.send::<Empty>(request)
            .await
            .map(|_| ())
            .map_err(BridgeFailure::into_notify_error)
    }
}
