use crate::error::AppError;
use crate::playback::controller::PlaybackController;
use chrono::Utc;
use domain::notifier::Notice;
use domain::speed::PlaybackSpeed;
use domain::stream::{StreamDescriptor, StreamType};
use domain::value::ChatId;
use domain::voice_call::VoiceCallError;
use log::{error, info};

impl PlaybackController {
    fn head_matches(&self, chat_id: ChatId, session: u64, locator: &str) -> bool {
        self.store
            .with_session(chat_id, session, |q| {
                q.head().map(|h| h.locator == locator).unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn stale(chat_id: ChatId, locator: &str) -> AppError {
        AppError::StaleState(format!(
            "chat {} is no longer playing {}",
            chat_id, locator
        ))
    }

    /// 以 `speed` 倍速继续播放当前条目。
    ///
    /// 非原速时先生成倍速副本并探测时长，按已播放位置换算出新位置后裁剪推流。
    /// 换流前后各校验一次队首仍是 `locator`，否则返回 `StaleState` 且不修改条目。
    pub async fn change_speed(
        &self,
        chat_id: ChatId,
        locator: &str,
        speed: PlaybackSpeed,
    ) -> Result<(), AppError> {
        let queue = self
            .store
            .snapshot(chat_id)
            .filter(|q| q.is_joined())
            .ok_or(AppError::NotJoined(chat_id))?;
        let session = queue.session;
        let account = queue.account.ok_or(AppError::NotJoined(chat_id))?;
        let head = queue
            .head()
            .cloned()
            .ok_or(AppError::NotJoined(chat_id))?;
        if head.locator != locator {
            return Err(Self::stale(chat_id, locator));
        }

        let source_position = head
            .speed
            .to_source_position(queue.elapsed_at(Utc::now()));
        let (speed_locator, duration) = if speed.is_normal() {
            let duration = head
                .original_duration_backup
                .as_ref()
                .map(|b| b.duration_seconds)
                .unwrap_or(head.duration_seconds);
            (head.locator.clone(), duration)
        } else {
            let copy = self.transcoder.speed_copy(locator, speed).await?;
            let duration = self.transcoder.probe_duration(&copy).await?;
            (copy, duration)
        };
        let position = speed.convert_played(source_position).min(duration);
        let descriptor =
            StreamDescriptor::new(&speed_locator, head.stream_type).clipped(position, duration);

        if !self.head_matches(chat_id, session, locator) {
            info!("[Speed] chat {} moved on before re-encode finished", chat_id);
            return Err(Self::stale(chat_id, locator));
        }
        if let Err(e) = self
            .driver
            .change_stream(account, chat_id, &descriptor)
            .await
        {
            return Err(self.stream_control_failure(chat_id, session, e).await);
        }

        let now = Utc::now();
        let applied = self.store.with_session(chat_id, session, |q| {
            if !q.head().map(|h| h.locator == locator).unwrap_or(false) {
                return false;
            }
            if let Some(h) = q.head_mut() {
                h.apply_speed(speed, speed_locator.clone(), duration, position);
            }
            q.restart_clock_at(position, now);
            true
        });
        if applied != Some(true) {
            return Err(Self::stale(chat_id, locator));
        }
        info!(
            "[Speed] chat {} now at {}x from {}s of {}s",
            chat_id, speed, position, duration
        );
        Ok(())
    }

    /// 跳转到 [start, end] 区间播放，不改动倍速与时长记录
    pub async fn seek(
        &self,
        chat_id: ChatId,
        locator: &str,
        start: u64,
        end: u64,
        mode: StreamType,
    ) -> Result<(), AppError> {
        let Ok((session, account)) = self.joined_account(chat_id) else {
            self.notify(chat_id, Notice::NotInCall).await;
            return Err(AppError::NotJoined(chat_id));
        };
        let descriptor = StreamDescriptor::new(locator, mode).clipped(start, end);
        match self
            .driver
            .change_stream(account, chat_id, &descriptor)
            .await
        {
            Ok(()) => {
                let now = Utc::now();
                self.store
                    .with_session(chat_id, session, |q| q.restart_clock_at(start, now));
                info!("[Seek] chat {} to {}s", chat_id, start);
                Ok(())
            }
            Err(VoiceCallError::CallNotFound) => {
                Err(self
                    .stream_control_failure(chat_id, session, VoiceCallError::CallNotFound)
                    .await)
            }
            Err(e) => {
                error!("Seek failed in chat {}: {}", chat_id, e);
                self.notify(chat_id, Notice::SeekFailed).await;
                Err(AppError::DriverTransient(e.to_string()))
            }
        }
    }

    /// 相对当前进度前进/后退 `offset` 秒，返回新的位置
    pub async fn seek_by(&self, chat_id: ChatId, offset: i64) -> Result<u64, AppError> {
        let queue = self
            .store
            .snapshot(chat_id)
            .filter(|q| q.is_joined())
            .ok_or(AppError::NotJoined(chat_id))?;
        let head = queue
            .head()
            .cloned()
            .ok_or(AppError::NotJoined(chat_id))?;
        if head.duration_seconds == 0 {
            return Err(AppError::InvalidInput(
                "live streams cannot be seeked".to_string(),
            ));
        }
        let target = queue.elapsed_at(Utc::now()) as i64 + offset;
        if target < 0 || target as u64 >= head.duration_seconds {
            return Err(AppError::InvalidInput(format!(
                "seek target {}s outside 0..{}s",
                target, head.duration_seconds
            )));
        }
        let target = target as u64;
        self.seek(
            chat_id,
            head.playing_locator(),
            target,
            head.duration_seconds,
            head.stream_type,
        )
        .await?;
        Ok(target)
    }

    /// 原地替换正在推的流，不经过队列
    pub async fn skip(&self, chat_id: ChatId, locator: &str, video: bool) -> Result<(), AppError> {
        let Ok((_, account)) = self.joined_account(chat_id) else {
            self.notify(chat_id, Notice::NotInCall).await;
            return Err(AppError::NotJoined(chat_id));
        };
        let descriptor = StreamDescriptor::new(locator, StreamType::from_video_flag(video));
        if let Err(e) = self
            .driver
            .change_stream(account, chat_id, &descriptor)
            .await
        {
            error!("Skip failed in chat {}: {}", chat_id, e);
            self.notify(chat_id, Notice::SkipFailed).await;
            return Err(AppError::DriverTransient(e.to_string()));
        }
        info!("[Skip] chat {} now streaming {}", chat_id, locator);
        Ok(())
    }

    /// 通话已不存在时清理会话并提示需要重新加入，其他错误原样上报
    async fn stream_control_failure(
        &self,
        chat_id: ChatId,
        session: u64,
        err: VoiceCallError,
    ) -> AppError {
        match err {
            VoiceCallError::CallNotFound => {
                error!("Group call of chat {} vanished", chat_id);
                self.teardown_quietly(chat_id, Some(session)).await;
                self.notify(chat_id, Notice::NotInCall).await;
                AppError::NotJoined(chat_id)
            }
            other => AppError::DriverTransient(other.to_string()),
        }
    }
}
