use crate::speed::PlaybackSpeed;
use crate::stream::{StreamDescriptor, StreamType};
use crate::time_format::seconds_to_min;
use crate::value::{AccountId, ChatId, MessageId};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// 队列条目的来源类型，决定切换到该条目时如何得到可播放的 locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 直播：每次开播前重新解析直链
    LiveUrl,
    /// 视频站资源：开播前下载到本地
    DownloadedFile,
    /// 索引流：locator 本身就是直链
    IndexedStream,
    /// 已就绪的本地文件或直链
    Generic,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LiveUrl => "live",
            SourceKind::DownloadedFile => "download",
            SourceKind::IndexedStream => "index",
            SourceKind::Generic => "generic",
        }
    }
}

/// 外部标识，用于生成"正在播放"卡片的链接与封面
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalId {
    Video(String),
    Telegram,
    SoundCloud,
    None,
}

impl ExternalId {
    pub fn video_id(&self) -> Option<&str> {
        match self {
            ExternalId::Video(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// 首次变速前的时长快照，换曲时用于恢复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationBackup {
    pub duration_seconds: u64,
    pub duration_display: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub source_kind: SourceKind,
    pub locator: String,
    pub title: String,
    pub requested_by: String,
    /// 发起播放请求的会话，可能与语音聊天所在会话不同
    pub origin_chat_id: ChatId,
    pub stream_type: StreamType,
    pub duration_seconds: u64,
    pub duration_display: String,
    pub elapsed_seconds: u64,
    pub speed: PlaybackSpeed,
    /// 变速后的文件路径，原速时为 None
    pub speed_locator: Option<String>,
    pub original_duration_backup: Option<DurationBackup>,
    pub external_id: ExternalId,
    pub ui_message_ref: Option<MessageId>,
}

impl QueueEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_kind: SourceKind,
        locator: impl Into<String>,
        title: impl Into<String>,
        requested_by: impl Into<String>,
        origin_chat_id: ChatId,
        stream_type: StreamType,
        duration_seconds: u64,
        external_id: ExternalId,
    ) -> Self {
        Self {
            source_kind,
            locator: locator.into(),
            title: title.into(),
            requested_by: requested_by.into(),
            origin_chat_id,
            stream_type,
            duration_seconds,
            duration_display: seconds_to_min(duration_seconds),
            elapsed_seconds: 0,
            speed: PlaybackSpeed::Normal,
            speed_locator: None,
            original_duration_backup: None,
            external_id,
            ui_message_ref: None,
        }
    }

    /// 当前实际推流的文件（变速后为倍速副本）
    pub fn playing_locator(&self) -> &str {
        self.speed_locator.as_deref().unwrap_or(&self.locator)
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.playing_locator(), self.stream_type)
    }

    pub fn set_elapsed(&mut self, seconds: u64) {
        self.elapsed_seconds = if self.duration_seconds > 0 {
            seconds.min(self.duration_seconds)
        } else {
            seconds
        };
    }

    /// 记录变速结果。首次切到非原速时保存原始时长，之后不再覆盖。
    pub fn apply_speed(
        &mut self,
        speed: PlaybackSpeed,
        speed_locator: String,
        duration_seconds: u64,
        elapsed_seconds: u64,
    ) {
        if !speed.is_normal() && self.original_duration_backup.is_none() {
            self.original_duration_backup = Some(DurationBackup {
                duration_seconds: self.duration_seconds,
                duration_display: self.duration_display.clone(),
            });
        }
        self.duration_seconds = duration_seconds;
        self.duration_display = seconds_to_min(duration_seconds);
        self.speed_locator = (!speed.is_normal()).then_some(speed_locator);
        self.speed = speed;
        self.set_elapsed(elapsed_seconds);
    }

    /// 自然换曲（含单曲循环重播）时重置播放进度并结束变速会话
    fn reset_for_playback(&mut self) {
        self.elapsed_seconds = 0;
        if let Some(backup) = self.original_duration_backup.take() {
            self.duration_seconds = backup.duration_seconds;
            self.duration_display = backup.duration_display;
            self.speed = PlaybackSpeed::Normal;
            self.speed_locator = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Joining,
    Playing,
    Transitioning,
    Stopping,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Joining => "joining",
            PlaybackState::Playing => "playing",
            PlaybackState::Transitioning => "transitioning",
            PlaybackState::Stopping => "stopping",
        }
    }
}

/// 曲目结束后队列的推进结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// 循环次数未用完，保留当前条目重播
    Looped,
    /// 弹出当前条目，新的队首开始播放
    Next,
    /// 队列已空
    Exhausted,
}

/// 单个会话的播放队列。`entries[0]` 永远是正在播放的条目。
#[derive(Debug, Clone)]
pub struct ChatQueue {
    pub chat_id: ChatId,
    /// 每次新建队列分配的会话号，用于识别被停止后重建的队列
    pub session: u64,
    pub entries: VecDeque<QueueEntry>,
    pub loop_count: u32,
    pub state: PlaybackState,
    pub account: Option<AccountId>,
    pub auto_end_deadline: Option<DateTime<Utc>>,
    pub paused: bool,
    pub muted: bool,
    /// 最近一次开始/恢复推流的时间，暂停时为 None
    pub resumed_at: Option<DateTime<Utc>>,
}

impl ChatQueue {
    pub fn new(chat_id: ChatId, session: u64, first: QueueEntry) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(first);
        Self {
            chat_id,
            session,
            entries,
            loop_count: 0,
            state: PlaybackState::Joining,
            account: None,
            auto_end_deadline: None,
            paused: false,
            muted: false,
            resumed_at: None,
        }
    }

    /// 入队，返回新条目在队列中的位置（0 为正在播放）
    pub fn push(&mut self, entry: QueueEntry) -> usize {
        self.entries.push_back(entry);
        self.entries.len() - 1
    }

    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.front_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_video(&self) -> bool {
        self.head().map(|e| e.stream_type.is_video()).unwrap_or(false)
    }

    pub fn is_joined(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Playing | PlaybackState::Transitioning
        )
    }

    pub fn advance(&mut self) -> Advance {
        let outcome = if self.loop_count > 0 {
            self.loop_count -= 1;
            Advance::Looped
        } else {
            self.entries.pop_front();
            Advance::Next
        };
        self.resumed_at = None;
        self.paused = false;
        match self.entries.front_mut() {
            Some(head) => {
                head.reset_for_playback();
                self.state = PlaybackState::Transitioning;
                outcome
            }
            None => {
                self.state = PlaybackState::Stopping;
                Advance::Exhausted
            }
        }
    }

    /// 当前条目的已播放秒数（含自上次恢复以来流逝的时间）
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        let Some(head) = self.head() else {
            return 0;
        };
        let running = self
            .resumed_at
            .map(|at| (now - at).num_seconds().max(0) as u64)
            .unwrap_or(0);
        let elapsed = head.elapsed_seconds + running;
        if head.duration_seconds > 0 {
            elapsed.min(head.duration_seconds)
        } else {
            elapsed
        }
    }

    pub fn mark_playing(&mut self, now: DateTime<Utc>) {
        self.state = PlaybackState::Playing;
        self.paused = false;
        self.resumed_at = Some(now);
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        let elapsed = self.elapsed_at(now);
        if let Some(head) = self.head_mut() {
            head.set_elapsed(elapsed);
        }
        self.paused = true;
        self.resumed_at = None;
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.paused = false;
        self.resumed_at = Some(now);
    }

    /// 跳转后从 `seconds` 处重新计时
    pub fn restart_clock_at(&mut self, seconds: u64, now: DateTime<Utc>) {
        if let Some(head) = self.head_mut() {
            head.set_elapsed(seconds);
        }
        if !self.paused {
            self.resumed_at = Some(now);
        }
    }
}
