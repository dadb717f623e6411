use crate::config::PlaybackConfig;
use crate::error::AppError;
use crate::playback::assistant_pool::AssistantPool;
use crate::playback::now_playing::build_card;
use crate::playback::queue_store::QueueStore;
use crate::shared::retry::{retry, RetryPolicy};
use chrono::Utc;
use domain::notifier::{Notice, Notifier};
use domain::queue::{Advance, ChatQueue, QueueEntry, SourceKind};
use domain::resolver::MediaResolver;
use domain::stream::StreamDescriptor;
use domain::transcoding::SpeedTranscoder;
use domain::value::{AccountId, ChatId, ParticipantId};
use domain::voice_call::{CallEvent, CallEventKind, EndedTrack, VoiceCallDriver, VoiceCallError};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 单曲循环次数上限
pub const MAX_LOOP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// 新加入语音聊天并开始播放
    Started,
    /// 已在播放，条目排在 `position`
    Queued { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 弹出一条，新的队首开始播放
    Advanced,
    /// 循环重播当前条目
    Looped,
    /// 队列耗尽，已退出语音聊天
    Exhausted,
    /// 同一会话已有换曲在进行，本次请求被合并
    Coalesced,
    /// 会话没有队列
    Idle,
    /// 换曲期间会话被停止，结果丢弃
    Superseded,
}

/// 会话播放控制器，队列状态只由它修改
pub struct PlaybackController {
    pub(crate) store: QueueStore,
    pub(crate) pool: AssistantPool,
    pub(crate) driver: Arc<dyn VoiceCallDriver>,
    pub(crate) resolver: Arc<dyn MediaResolver>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) transcoder: Arc<dyn SpeedTranscoder>,
    pub(crate) config: Arc<dyn PlaybackConfig>,
}

impl PlaybackController {
    pub fn new(
        pool: AssistantPool,
        driver: Arc<dyn VoiceCallDriver>,
        resolver: Arc<dyn MediaResolver>,
        notifier: Arc<dyn Notifier>,
        transcoder: Arc<dyn SpeedTranscoder>,
        config: Arc<dyn PlaybackConfig>,
    ) -> Self {
        Self {
            store: QueueStore::new(),
            pool,
            driver,
            resolver,
            notifier,
            transcoder,
            config,
        }
    }

    fn change_stream_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.config.change_stream_attempts(),
            Duration::from_millis(self.config.change_stream_backoff_ms()),
        )
    }

    /// 入队；会话空闲时加入语音聊天并开始播放
    pub async fn ensure_playing(
        &self,
        chat_id: ChatId,
        entry: QueueEntry,
    ) -> Result<PlayOutcome, AppError> {
        let origin = entry.origin_chat_id;
        let mut first = entry.clone();
        let title = entry.title.clone();
        let enqueued = self.store.enqueue(chat_id, entry);
        if !enqueued.created {
            info!(
                "Queued \"{}\" at position {} in chat {}",
                title, enqueued.position, chat_id
            );
            return Ok(PlayOutcome::Queued {
                position: enqueued.position,
            });
        }
        let session = enqueued.session;

        // 加入期间持有换曲锁，手动切歌会被合并
        let lock = self
            .store
            .transition_lock(chat_id)
            .ok_or_else(|| AppError::StaleState(format!("chat {} vanished", chat_id)))?;
        let Ok(_guard) = lock.try_lock_owned() else {
            return Ok(PlayOutcome::Queued { position: 0 });
        };

        let locator = match self.prepare_locator(&first, Advance::Next).await {
            Ok(locator) => locator,
            Err(e) => {
                error!("Failed to prepare \"{}\" in chat {}: {}", title, chat_id, e);
                if self.store.is_session(chat_id, session) {
                    self.notify(origin, Notice::StreamFailed).await;
                    self.teardown_quietly(chat_id, Some(session)).await;
                }
                return Err(e);
            }
        };
        if locator != first.locator {
            let stored = self.store.with_session(chat_id, session, |q| {
                if let Some(h) = q.head_mut() {
                    h.locator = locator.clone();
                }
            });
            if stored.is_none() {
                info!("Chat {} was stopped while preparing \"{}\"", chat_id, title);
                return Err(AppError::StaleState(format!(
                    "chat {} stopped while preparing",
                    chat_id
                )));
            }
        }
        first.locator = locator;
        let descriptor = first.descriptor();

        let account = match self.pool.assign(chat_id) {
            Ok(account) => account,
            Err(e) => {
                self.teardown_quietly(chat_id, Some(session)).await;
                return Err(e);
            }
        };
        self.store
            .with_session(chat_id, session, |q| q.account = Some(account));

        info!(
            "[Join] chat {} via account {}, {} stream \"{}\"",
            chat_id,
            account,
            descriptor.stream_type().as_str(),
            title
        );
        match self.driver.join(account, chat_id, &descriptor).await {
            Ok(()) => {}
            Err(VoiceCallError::AlreadyJoined) => {
                warn!(
                    "Account {} already in call of chat {}, swapping stream in place",
                    account, chat_id
                );
                if let Err(e) = self
                    .driver
                    .change_stream(account, chat_id, &descriptor)
                    .await
                {
                    error!("Failed to swap stream in chat {}: {}", chat_id, e);
                    self.notify(origin, Notice::JoinFailed).await;
                    self.teardown_quietly(chat_id, Some(session)).await;
                    return Err(AppError::DriverFatal(e.to_string()));
                }
            }
            Err(VoiceCallError::NoActiveCall) => {
                warn!("No active group call in chat {}", chat_id);
                self.notify(origin, Notice::NoActiveCall).await;
                self.teardown_quietly(chat_id, Some(session)).await;
                return Err(AppError::NoActiveCall(chat_id));
            }
            Err(VoiceCallError::ServerError(msg)) => {
                error!("Server error while joining chat {}: {}", chat_id, msg);
                self.notify(origin, Notice::JoinServerError).await;
                self.teardown_quietly(chat_id, Some(session)).await;
                return Err(AppError::DriverTransient(msg));
            }
            Err(e) => {
                error!("Failed to join chat {}: {}", chat_id, e);
                self.notify(origin, Notice::JoinFailed).await;
                self.teardown_quietly(chat_id, Some(session)).await;
                return Err(AppError::DriverFatal(e.to_string()));
            }
        }

        let now = Utc::now();
        if self
            .store
            .with_session(chat_id, session, |q| q.mark_playing(now))
            .is_none()
        {
            // 加入过程中会话已被停止，补一次退出保证不会残留通话
            warn!("Chat {} was stopped while joining, leaving again", chat_id);
            self.leave_tolerant(account, chat_id).await;
            return Err(AppError::StaleState(format!(
                "chat {} stopped while joining",
                chat_id
            )));
        }

        self.arm_auto_end_after_join(chat_id, account, session)
            .await;
        self.announce(chat_id, session).await;
        Ok(PlayOutcome::Started)
    }

    /// 语音驱动报告曲目播放完毕
    pub async fn on_stream_ended(&self, chat_id: ChatId) -> Result<TransitionOutcome, AppError> {
        self.advance(chat_id, "stream ended").await
    }

    /// 手动切到下一首
    pub async fn next_track(&self, chat_id: ChatId) -> Result<TransitionOutcome, AppError> {
        if !self.store.contains(chat_id) {
            return Err(AppError::NotJoined(chat_id));
        }
        self.advance(chat_id, "manual next").await
    }

    async fn advance(&self, chat_id: ChatId, trigger: &str) -> Result<TransitionOutcome, AppError> {
        let Some(lock) = self.store.transition_lock(chat_id) else {
            debug!("No queue for chat {}, ignoring {}", chat_id, trigger);
            return Ok(TransitionOutcome::Idle);
        };
        let Ok(_guard) = lock.try_lock_owned() else {
            info!(
                "Transition already running in chat {}, {} coalesced",
                chat_id, trigger
            );
            return Ok(TransitionOutcome::Coalesced);
        };

        let step = self.store.with_queue(chat_id, |q| {
            let advance = q.advance();
            (q.session, advance, q.account, q.head().cloned())
        });
        let Some((session, advance, account, head)) = step else {
            return Ok(TransitionOutcome::Idle);
        };
        let (account, head) = match (advance, account, head) {
            (Advance::Exhausted, _, _) => {
                info!("Queue of chat {} exhausted ({})", chat_id, trigger);
                self.teardown_quietly(chat_id, Some(session)).await;
                return Ok(TransitionOutcome::Exhausted);
            }
            (_, Some(account), Some(head)) => (account, head),
            _ => {
                warn!("Queue of chat {} has no account, treating as exhausted", chat_id);
                self.teardown_quietly(chat_id, Some(session)).await;
                return Ok(TransitionOutcome::Exhausted);
            }
        };
        info!(
            "[Transition] chat {} ({}): {:?} -> \"{}\"",
            chat_id, trigger, advance, head.title
        );

        let locator = match self.prepare_locator(&head, advance).await {
            Ok(locator) => locator,
            Err(e) => {
                error!("Failed to prepare \"{}\" in chat {}: {}", head.title, chat_id, e);
                if self.store.is_session(chat_id, session) {
                    self.notify(head.origin_chat_id, Notice::StreamFailed).await;
                    self.teardown_quietly(chat_id, Some(session)).await;
                }
                return Err(e);
            }
        };
        if locator != head.locator {
            self.store.with_session(chat_id, session, |q| {
                if let Some(h) = q.head_mut() {
                    h.locator = locator.clone();
                }
            });
        }

        let descriptor = StreamDescriptor::new(&locator, head.stream_type);
        let label = format!("change_stream chat {}", chat_id);
        let result = retry(
            &self.change_stream_policy(),
            &label,
            |_| self.driver.change_stream(account, chat_id, &descriptor),
            |_| self.store.is_session(chat_id, session),
        )
        .await;

        match result {
            Ok(()) => {
                let now = Utc::now();
                if self
                    .store
                    .with_session(chat_id, session, |q| q.mark_playing(now))
                    .is_none()
                {
                    info!("Chat {} stopped during transition, dropping result", chat_id);
                    return Ok(TransitionOutcome::Superseded);
                }
                self.announce(chat_id, session).await;
                Ok(match advance {
                    Advance::Looped => TransitionOutcome::Looped,
                    _ => TransitionOutcome::Advanced,
                })
            }
            Err(e) => {
                if !self.store.is_session(chat_id, session) {
                    info!("Chat {} stopped during transition: {}", chat_id, e);
                    return Ok(TransitionOutcome::Superseded);
                }
                self.notify(head.origin_chat_id, Notice::StreamFailed).await;
                self.teardown_quietly(chat_id, Some(session)).await;
                Err(AppError::DriverFatal(e.to_string()))
            }
        }
    }

    /// 得到条目可直接推流的 locator：直播重新取直链，视频站资源先下载
    pub(crate) async fn prepare_locator(&self, head: &QueueEntry, advance: Advance) -> Result<String, AppError> {
        let video = head.stream_type.is_video();
        match (head.source_kind, head.external_id.video_id()) {
            (SourceKind::LiveUrl, Some(id)) => Ok(self.resolver.live_url(id, video).await?),
            // 循环重播时文件已在本地
            (SourceKind::DownloadedFile, Some(id)) if advance != Advance::Looped => {
                let origin = head.origin_chat_id;
                let progress = match self.notifier.notify(origin, Notice::Downloading).await {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!("Failed to send download notice to chat {}: {}", origin, e);
                        None
                    }
                };
                let downloaded = self.resolver.download(id, video).await;
                if let Some(message) = progress {
                    if let Err(e) = self.notifier.delete(origin, message).await {
                        warn!("Failed to delete download notice in chat {}: {}", origin, e);
                    }
                }
                Ok(downloaded?)
            }
            _ => Ok(head.locator.clone()),
        }
    }

    /// 发送"正在播放"卡片并记录消息句柄
    pub(crate) async fn announce(&self, chat_id: ChatId, session: u64) {
        let Some(head) = self
            .store
            .with_session(chat_id, session, |q| q.head().cloned())
            .flatten()
        else {
            return;
        };
        let thumbnail = match head.external_id.video_id() {
            Some(id) => match self.resolver.thumbnail(id).await {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!("No thumbnail for {}: {}", id, e);
                    None
                }
            },
            None => None,
        };
        let card = build_card(self.config.as_ref(), chat_id, &head, thumbnail);
        match self.notifier.now_playing(head.origin_chat_id, &card).await {
            Ok(message) => {
                self.store.with_session(chat_id, session, |q| {
                    if let Some(h) = q.head_mut().filter(|h| h.locator == head.locator) {
                        h.ui_message_ref = Some(message);
                    }
                });
            }
            Err(e) => warn!("Failed to send now playing card for chat {}: {}", chat_id, e),
        }
    }

    /// 停止播放：清空队列并退出语音聊天，未在通话中不算错误
    pub async fn stop(&self, chat_id: ChatId) -> Result<(), AppError> {
        info!("[Stop] chat {}", chat_id);
        self.teardown(chat_id, None).await
    }

    /// 通过池内所有账号退出，用于状态不一致时的强制清理
    pub async fn force_stop(&self, chat_id: ChatId) -> Result<(), AppError> {
        info!("[ForceStop] chat {}", chat_id);
        self.store.remove(chat_id);
        self.pool.release(chat_id);
        for account in self.pool.accounts() {
            self.leave_tolerant(*account, chat_id).await;
        }
        Ok(())
    }

    pub async fn reboot(&self, chat_id: ChatId) -> Result<(), AppError> {
        if let Err(e) = self.force_stop(chat_id).await {
            self.notify(chat_id, Notice::ResetFailed).await;
            return Err(e);
        }
        self.notify(chat_id, Notice::StateReset).await;
        Ok(())
    }

    /// 通话生命周期事件的统一分派
    pub async fn on_call_event(&self, event: &CallEvent) -> Result<(), AppError> {
        let chat_id = event.chat_id;
        let queue = self.store.snapshot(chat_id);
        if let Some(assigned) = queue.as_ref().and_then(|q| q.account) {
            if assigned != event.account {
                debug!(
                    "Ignoring {} from account {}, chat {} is served by {}",
                    event.kind.as_str(),
                    event.account,
                    chat_id,
                    assigned
                );
                return Ok(());
            }
        }
        match event.kind {
            CallEventKind::StreamEnded(EndedTrack::Video) => {
                debug!("Video track ended in chat {}, waiting for audio", chat_id);
                Ok(())
            }
            CallEventKind::StreamEnded(EndedTrack::Audio) => {
                self.on_stream_ended(chat_id).await.map(|_| ())
            }
            CallEventKind::Left => {
                info!("Account {} left chat {}", event.account, chat_id);
                self.teardown(chat_id, None).await
            }
            CallEventKind::Kicked | CallEventKind::CallClosed => {
                warn!(
                    "Call of chat {} terminated ({}), manual rejoin required",
                    chat_id,
                    event.kind.as_str()
                );
                let origin = queue
                    .as_ref()
                    .and_then(|q| q.head().map(|h| h.origin_chat_id))
                    .unwrap_or(chat_id);
                // 退出失败也要提示，通话本身已经不在了
                self.teardown_quietly(chat_id, None).await;
                if queue.is_some() {
                    self.notify(origin, Notice::NotInCall).await;
                }
                Ok(())
            }
        }
    }

    pub async fn pause(&self, chat_id: ChatId) -> Result<(), AppError> {
        let (session, account) = self.joined_account(chat_id)?;
        if self.is_paused(chat_id) {
            return Ok(());
        }
        self.driver
            .pause(account, chat_id)
            .await
            .map_err(|e| AppError::from_driver(chat_id, e))?;
        let now = Utc::now();
        self.store.with_session(chat_id, session, |q| q.pause(now));
        info!("[Pause] chat {}", chat_id);
        Ok(())
    }

    pub async fn resume(&self, chat_id: ChatId) -> Result<(), AppError> {
        let (session, account) = self.joined_account(chat_id)?;
        if !self.is_paused(chat_id) {
            return Ok(());
        }
        self.driver
            .resume(account, chat_id)
            .await
            .map_err(|e| AppError::from_driver(chat_id, e))?;
        let now = Utc::now();
        self.store.with_session(chat_id, session, |q| q.resume(now));
        info!("[Resume] chat {}", chat_id);
        Ok(())
    }

    pub async fn mute(&self, chat_id: ChatId) -> Result<(), AppError> {
        let (session, account) = self.joined_account(chat_id)?;
        self.driver
            .mute(account, chat_id)
            .await
            .map_err(|e| AppError::from_driver(chat_id, e))?;
        self.store.with_session(chat_id, session, |q| q.muted = true);
        Ok(())
    }

    pub async fn unmute(&self, chat_id: ChatId) -> Result<(), AppError> {
        let (session, account) = self.joined_account(chat_id)?;
        self.driver
            .unmute(account, chat_id)
            .await
            .map_err(|e| AppError::from_driver(chat_id, e))?;
        self.store.with_session(chat_id, session, |q| q.muted = false);
        Ok(())
    }

    pub fn set_loop(&self, chat_id: ChatId, count: u32) -> Result<u32, AppError> {
        if count > MAX_LOOP {
            return Err(AppError::InvalidInput(format!(
                "loop count must be between 0 and {}",
                MAX_LOOP
            )));
        }
        let (session, _) = self.joined_account(chat_id)?;
        self.store
            .with_session(chat_id, session, |q| {
                q.loop_count = count;
                count
            })
            .ok_or(AppError::NotJoined(chat_id))
    }

    /// 未加入时返回空列表
    pub async fn participants(&self, chat_id: ChatId) -> Result<Vec<ParticipantId>, AppError> {
        let Ok((_, account)) = self.joined_account(chat_id) else {
            return Ok(Vec::new());
        };
        self.driver
            .participants(account, chat_id)
            .await
            .map_err(|e| AppError::from_driver(chat_id, e))
    }

    /// 池内账号的平均延迟（毫秒）
    pub async fn ping(&self) -> Result<f64, AppError> {
        let mut samples = Vec::new();
        for account in self.pool.accounts() {
            match self.driver.ping(*account).await {
                Ok(ms) => samples.push(ms),
                Err(e) => warn!("Ping failed for account {}: {}", account, e),
            }
        }
        if samples.is_empty() {
            return Err(AppError::DriverTransient(
                "no assistant answered ping".to_string(),
            ));
        }
        Ok(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn queue_status(&self, chat_id: ChatId) -> Option<ChatQueue> {
        self.store.snapshot(chat_id)
    }

    pub fn active_chats(&self) -> Vec<ChatId> {
        self.store.active_chats()
    }

    pub fn active_video_chats(&self) -> Vec<ChatId> {
        self.store.active_video_chats()
    }

    pub(crate) fn joined_account(&self, chat_id: ChatId) -> Result<(u64, AccountId), AppError> {
        self.store
            .snapshot(chat_id)
            .filter(|q| q.is_joined())
            .and_then(|q| q.account.map(|account| (q.session, account)))
            .ok_or(AppError::NotJoined(chat_id))
    }

    fn is_paused(&self, chat_id: ChatId) -> bool {
        self.store
            .with_queue(chat_id, |q| q.paused)
            .unwrap_or(false)
    }

    /// 清空会话状态并退出通话。`session` 为 Some 时只清理对应的那一轮。
    pub(crate) async fn teardown(
        &self,
        chat_id: ChatId,
        session: Option<u64>,
    ) -> Result<(), AppError> {
        let removed = match session {
            Some(session) => match self.store.remove_session(chat_id, session) {
                Some(queue) => Some(queue),
                // 已被其他路径清理
                None => return Ok(()),
            },
            None => self.store.remove(chat_id),
        };
        let assigned = self.pool.release(chat_id);
        let Some(account) = removed
            .and_then(|q| q.account)
            .or(assigned)
            .or_else(|| self.pool.candidate())
        else {
            return Ok(());
        };
        match self.driver.leave(account, chat_id).await {
            Ok(()) | Err(VoiceCallError::CallNotFound) => Ok(()),
            Err(e) => {
                warn!("Failed to leave chat {} with account {}: {}", chat_id, account, e);
                Err(AppError::from_driver(chat_id, e))
            }
        }
    }

    pub(crate) async fn teardown_quietly(&self, chat_id: ChatId, session: Option<u64>) {
        if let Err(e) = self.teardown(chat_id, session).await {
            warn!("Teardown of chat {} incomplete: {}", chat_id, e);
        }
    }

    async fn leave_tolerant(&self, account: AccountId, chat_id: ChatId) {
        match self.driver.leave(account, chat_id).await {
            Ok(()) | Err(VoiceCallError::CallNotFound) => {}
            Err(e) => warn!("Account {} failed to leave chat {}: {}", account, chat_id, e),
        }
    }

    pub(crate) async fn notify(&self, chat_id: ChatId, notice: Notice) {
        let key = notice.key();
        if let Err(e) = self.notifier.notify(chat_id, notice).await {
            warn!("Failed to send {} notice to chat {}: {}", key, chat_id, e);
        }
    }
}
