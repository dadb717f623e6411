use application::playback::{AutoEndStatus, PlayOutcome, TransitionOutcome};
use chrono::{DateTime, Utc};
use domain::queue::{ChatQueue, QueueEntry};
use domain::value::{AccountId, ChatId};
use domain::voice_call::{CallEvent, CallEventKind, EndedTrack};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PlayBody {
    pub query: String,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub requested_by: String,
    /// 缺省为语音聊天所在会话
    pub origin_chat_id: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PlayResponse {
    pub outcome: &'static str,
    pub position: usize,
}

impl From<PlayOutcome> for PlayResponse {
    fn from(outcome: PlayOutcome) -> Self {
        match outcome {
            PlayOutcome::Started => Self {
                outcome: "started",
                position: 0,
            },
            PlayOutcome::Queued { position } => Self {
                outcome: "queued",
                position,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub outcome: &'static str,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        let outcome = match outcome {
            TransitionOutcome::Advanced => "advanced",
            TransitionOutcome::Looped => "looped",
            TransitionOutcome::Exhausted => "exhausted",
            TransitionOutcome::Coalesced => "coalesced",
            TransitionOutcome::Idle => "idle",
            TransitionOutcome::Superseded => "superseded",
        };
        Self { outcome }
    }
}

#[derive(Debug, Deserialize)]
pub struct SkipBody {
    pub locator: String,
    #[serde(default)]
    pub video: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekBody {
    /// 相对当前进度的秒数，负数为后退
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct SeekResponse {
    pub position: u64,
}

#[derive(Debug, Deserialize)]
pub struct SpeedBody {
    pub speed: f32,
    /// 缺省为当前队首
    pub locator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoopBody {
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct LoopResponse {
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct EntryDto {
    pub title: String,
    pub source: &'static str,
    pub stream_type: &'static str,
    pub duration: String,
    pub duration_seconds: u64,
    pub requested_by: String,
    pub speed: &'static str,
}

impl From<&QueueEntry> for EntryDto {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            title: entry.title.clone(),
            source: entry.source_kind.as_str(),
            stream_type: entry.stream_type.as_str(),
            duration: entry.duration_display.clone(),
            duration_seconds: entry.duration_seconds,
            requested_by: entry.requested_by.clone(),
            speed: entry.speed.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueDto {
    pub chat_id: i64,
    pub state: &'static str,
    pub account: Option<i64>,
    pub loop_count: u32,
    pub paused: bool,
    pub muted: bool,
    pub elapsed_seconds: u64,
    pub auto_end_deadline: Option<DateTime<Utc>>,
    pub entries: Vec<EntryDto>,
}

impl QueueDto {
    pub fn from_queue(queue: &ChatQueue, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: queue.chat_id.as_i64(),
            state: queue.state.as_str(),
            account: queue.account.map(|a| a.as_i64()),
            loop_count: queue.loop_count,
            paused: queue.paused,
            muted: queue.muted,
            elapsed_seconds: queue.elapsed_at(now),
            auto_end_deadline: queue.auto_end_deadline,
            entries: queue.entries.iter().map(EntryDto::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActiveChatsResponse {
    pub chats: Vec<i64>,
    pub video_chats: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ping_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct AutoEndResponse {
    pub status: &'static str,
    pub deadline: Option<DateTime<Utc>>,
}

impl From<AutoEndStatus> for AutoEndResponse {
    fn from(status: AutoEndStatus) -> Self {
        let (status, deadline) = match status {
            AutoEndStatus::Disabled => ("disabled", None),
            AutoEndStatus::NotJoined => ("not_joined", None),
            AutoEndStatus::Listening => ("listening", None),
            AutoEndStatus::Armed(at) => ("armed", Some(at)),
            AutoEndStatus::Pending(at) => ("pending", Some(at)),
            AutoEndStatus::Ended => ("ended", None),
            AutoEndStatus::Unknown => ("unknown", None),
        };
        Self { status, deadline }
    }
}

/// 桥接服务上报的通话事件
#[derive(Debug, Deserialize)]
pub struct CallEventBody {
    pub account: i64,
    pub chat_id: i64,
    pub kind: String,
}

impl CallEventBody {
    pub fn into_event(self) -> Option<CallEvent> {
        let kind = match self.kind.as_str() {
            "stream_ended" => CallEventKind::StreamEnded(EndedTrack::Audio),
            "video_ended" => CallEventKind::StreamEnded(EndedTrack::Video),
            "left" => CallEventKind::Left,
            "kicked" => CallEventKind::Kicked,
            "call_closed" => CallEventKind::CallClosed,
            _ => return None,
        };
        Some(CallEvent {
            account: AccountId::from(self.account),
            chat_id: ChatId::from(self.chat_id),
            kind,
        })
    }
}
