use crate::config::PlaybackConfig;
use crate::playback::{AssistantPool, PlaybackController};
use async_trait::async_trait;
use domain::notifier::{Notice, NotifyError, NowPlayingCard, Notifier};
use domain::queue::{ExternalId, SourceKind};
use domain::resolver::{MediaResolver, ResolveError, ResolvedTrack, TrackMetadata};
use domain::speed::PlaybackSpeed;
use domain::stream::StreamDescriptor;
use domain::transcoding::{SpeedTranscoder, TranscodeError};
use domain::value::{AccountId, ChatId, MessageId, ParticipantId};
use domain::voice_call::{VoiceCallDriver, VoiceCallError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Join(AccountId, ChatId, StreamDescriptor),
    ChangeStream(AccountId, ChatId, StreamDescriptor),
    Leave(AccountId, ChatId),
    Pause(ChatId),
    Resume(ChatId),
    Mute(ChatId),
    Unmute(ChatId),
}

/// 内存版语音驱动，记录所有调用
pub struct FakeDriver {
    pub calls: Mutex<Vec<DriverCall>>,
    joined: Mutex<HashSet<(AccountId, ChatId)>>,
    pub join_error: Mutex<Option<VoiceCallError>>,
    pub leave_error: Mutex<Option<VoiceCallError>>,
    /// 接下来多少次 change_stream 失败
    pub change_stream_failures: AtomicU32,
    pub change_stream_delay: Mutex<Duration>,
    pub participant_count: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            joined: Mutex::new(HashSet::new()),
            join_error: Mutex::new(None),
            leave_error: Mutex::new(None),
            change_stream_failures: AtomicU32::new(0),
            change_stream_delay: Mutex::new(Duration::ZERO),
            participant_count: AtomicUsize::new(3),
        }
    }

    pub fn set_participants(&self, count: usize) {
        self.participant_count.store(count, Ordering::SeqCst);
    }

    pub fn set_change_stream_delay(&self, delay: Duration) {
        *self.change_stream_delay.lock().unwrap() = delay;
    }

    pub fn mark_joined(&self, account: AccountId, chat_id: ChatId) {
        self.joined.lock().unwrap().insert((account, chat_id));
    }

    pub fn leave_count(&self, chat_id: ChatId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, DriverCall::Leave(_, chat) if *chat == chat_id))
            .count()
    }

    pub fn leave_accounts(&self, chat_id: ChatId) -> Vec<AccountId> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Leave(account, chat) if *chat == chat_id => Some(*account),
                _ => None,
            })
            .collect()
    }

    pub fn change_streams(&self, chat_id: ChatId) -> Vec<StreamDescriptor> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                DriverCall::ChangeStream(_, chat, d) if *chat == chat_id => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn join_descriptors(&self, chat_id: ChatId) -> Vec<StreamDescriptor> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Join(_, chat, d) if *chat == chat_id => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn joins(&self, chat_id: ChatId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, DriverCall::Join(_, chat, _) if *chat == chat_id))
            .count()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_in_call(&self, account: AccountId, chat_id: ChatId) -> bool {
        self.joined.lock().unwrap().contains(&(account, chat_id))
    }
}

#[async_trait]
impl VoiceCallDriver for FakeDriver {
    async fn join(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Join(account, chat_id, stream.clone()));
        if let Some(err) = self.join_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.mark_joined(account, chat_id);
        Ok(())
    }

    async fn change_stream(
        &self,
        account: AccountId,
        chat_id: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), VoiceCallError> {
        let delay = *self.change_stream_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.record(DriverCall::ChangeStream(account, chat_id, stream.clone()));
        if !self.is_in_call(account, chat_id) {
            return Err(VoiceCallError::CallNotFound);
        }
        let failures = self.change_stream_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.change_stream_failures
                .store(failures - 1, Ordering::SeqCst);
            return Err(VoiceCallError::Other("stream swap rejected".to_string()));
        }
        Ok(())
    }

    async fn leave(&self, account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Leave(account, chat_id));
        if let Some(err) = self.leave_error.lock().unwrap().clone() {
            return Err(err);
        }
        if self.joined.lock().unwrap().remove(&(account, chat_id)) {
            Ok(())
        } else {
            Err(VoiceCallError::CallNotFound)
        }
    }

    async fn pause(&self, _account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Pause(chat_id));
        Ok(())
    }

    async fn resume(&self, _account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Resume(chat_id));
        Ok(())
    }

    async fn mute(&self, _account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Mute(chat_id));
        Ok(())
    }

    async fn unmute(&self, _account: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.record(DriverCall::Unmute(chat_id));
        Ok(())
    }

    async fn participants(
        &self,
        _account: AccountId,
        _chat_id: ChatId,
    ) -> Result<Vec<ParticipantId>, VoiceCallError> {
        let count = self.participant_count.load(Ordering::SeqCst);
        Ok((0..count as i64).map(ParticipantId::from).collect())
    }

    async fn ping(&self, account: AccountId) -> Result<f64, VoiceCallError> {
        Ok(10.0 * account.as_i64() as f64)
    }
}

#[derive(Default)]
pub struct FakeResolver {
    pub downloads: AtomicU32,
}

#[async_trait]
impl MediaResolver for FakeResolver {
    /// `yt:<id>` 解析为待下载的视频，`live:<id>` 解析为直播，其余查无结果
    async fn resolve(&self, query: &str, _want_video: bool) -> Result<ResolvedTrack, ResolveError> {
        let (source_kind, id, duration) = if let Some(id) = query.strip_prefix("yt:") {
            (SourceKind::DownloadedFile, id, 200)
        } else if let Some(id) = query.strip_prefix("live:") {
            (SourceKind::LiveUrl, id, 0)
        } else {
            return Err(ResolveError::NotFound(query.to_string()));
        };
        let link = format!("https://www.youtube.com/watch?v={}", id);
        Ok(ResolvedTrack {
            metadata: TrackMetadata {
                title: format!("Track {}", id),
                duration_seconds: duration,
                thumbnail: None,
                external_id: ExternalId::Video(id.to_string()),
                link: link.clone(),
                is_live: duration == 0,
            },
            source_kind,
            locator: link,
        })
    }

    async fn live_url(&self, video_id: &str, _want_video: bool) -> Result<String, ResolveError> {
        Ok(format!("https://live.example/{}.m3u8", video_id))
    }

    async fn download(&self, video_id: &str, want_video: bool) -> Result<String, ResolveError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if video_id == "broken" {
            return Err(ResolveError::Download("unavailable".to_string()));
        }
        let ext = if want_video { "mp4" } else { "m4a" };
        Ok(format!("/downloads/{}.{}", video_id, ext))
    }

    async fn thumbnail(&self, video_id: &str) -> Result<String, ResolveError> {
        Ok(format!("https://img.example/{}.jpg", video_id))
    }
}

pub struct FakeNotifier {
    pub notices: Mutex<Vec<(ChatId, Notice)>>,
    pub cards: Mutex<Vec<(ChatId, NowPlayingCard)>>,
    pub deleted: Mutex<Vec<(ChatId, MessageId)>>,
    next_id: AtomicI64,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            cards: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn notices_for(&self, chat_id: ChatId) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn card_titles(&self) -> Vec<String> {
        self.cards
            .lock()
            .unwrap()
            .iter()
            .map(|(_, card)| card.title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, chat_id: ChatId, notice: Notice) -> Result<MessageId, NotifyError> {
        self.notices.lock().unwrap().push((chat_id, notice));
        Ok(MessageId::from(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn now_playing(
        &self,
        chat_id: ChatId,
        card: &NowPlayingCard,
    ) -> Result<MessageId, NotifyError> {
        self.cards.lock().unwrap().push((chat_id, card.clone()));
        Ok(MessageId::from(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete(&self, chat_id: ChatId, message: MessageId) -> Result<(), NotifyError> {
        self.deleted.lock().unwrap().push((chat_id, message));
        Ok(())
    }
}

/// 倍速转码替身；`gated` 时在放行前一直挂起，用于模拟耗时的重编码
pub struct FakeTranscoder {
    pub gated: bool,
    pub entered: Notify,
    pub gate: Notify,
    pub duration: u64,
}

impl FakeTranscoder {
    pub fn new(duration: u64) -> Self {
        Self {
            gated: false,
            entered: Notify::new(),
            gate: Notify::new(),
            duration,
        }
    }

    pub fn gated(duration: u64) -> Self {
        Self {
            gated: true,
            ..Self::new(duration)
        }
    }
}

#[async_trait]
impl SpeedTranscoder for FakeTranscoder {
    async fn speed_copy(&self, source: &str, speed: PlaybackSpeed) -> Result<String, TranscodeError> {
        if self.gated {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        let name = source.rsplit('/').next().unwrap_or(source);
        Ok(format!("/playback/{}/{}", speed.as_str(), name))
    }

    async fn probe_duration(&self, _path: &str) -> Result<u64, TranscodeError> {
        Ok(self.duration)
    }
}

pub struct TestConfig {
    pub auto_end_enabled: bool,
    pub auto_end_after_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auto_end_enabled: false,
            auto_end_after_secs: 60,
        }
    }
}

impl PlaybackConfig for TestConfig {
    fn auto_end_enabled(&self) -> bool {
        self.auto_end_enabled
    }
    fn auto_end_after_secs(&self) -> u64 {
        self.auto_end_after_secs
    }
    fn change_stream_attempts(&self) -> u32 {
        3
    }
    fn change_stream_backoff_ms(&self) -> u64 {
        1
    }
    fn bot_username(&self) -> String {
        "vc_player_bot".to_string()
    }
    fn support_chat(&self) -> String {
        "https://t.me/vc_support".to_string()
    }
    fn stream_image(&self) -> String {
        "https://img.example/stream.png".to_string()
    }
    fn telegram_audio_image(&self) -> String {
        "https://img.example/tg_audio.png".to_string()
    }
    fn telegram_video_image(&self) -> String {
        "https://img.example/tg_video.png".to_string()
    }
    fn soundcloud_image(&self) -> String {
        "https://img.example/soundcloud.png".to_string()
    }
    fn youtube_image(&self) -> String {
        "https://img.example/youtube.png".to_string()
    }
}

pub struct Harness {
    pub controller: Arc<PlaybackController>,
    pub driver: Arc<FakeDriver>,
    pub resolver: Arc<FakeResolver>,
    pub notifier: Arc<FakeNotifier>,
    pub transcoder: Arc<FakeTranscoder>,
}

pub fn harness_with(config: TestConfig, transcoder: FakeTranscoder) -> Harness {
    let driver = Arc::new(FakeDriver::new());
    let resolver = Arc::new(FakeResolver::default());
    let notifier = Arc::new(FakeNotifier::new());
    let transcoder = Arc::new(transcoder);
    let pool = AssistantPool::new(vec![AccountId::from(1), AccountId::from(2)]);
    let controller = Arc::new(PlaybackController::new(
        pool,
        driver.clone(),
        resolver.clone(),
        notifier.clone(),
        transcoder.clone(),
        Arc::new(config),
    ));
    Harness {
        controller,
        driver,
        resolver,
        notifier,
        transcoder,
    }
}

pub fn harness() -> Harness {
    harness_with(TestConfig::default(), FakeTranscoder::new(60))
}
