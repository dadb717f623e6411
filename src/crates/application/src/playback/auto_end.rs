use crate::error::AppError;
use crate::playback::controller::PlaybackController;
use chrono::{DateTime, Duration, Utc};
use domain::notifier::Notice;
use domain::value::{AccountId, ChatId};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoEndStatus {
    Disabled,
    /// 会话未加入语音聊天
    NotJoined,
    /// 有听众，截止时间已清除
    Listening,
    /// 刚发现无人收听，设置了截止时间
    Armed(DateTime<Utc>),
    /// 仍无人收听，截止时间未到
    Pending(DateTime<Utc>),
    /// 截止时间已过，已退出
    Ended,
    /// 参与者数量获取失败，本次不做判断
    Unknown,
}

enum Decision {
    Keep(AutoEndStatus),
    Stop,
}

impl PlaybackController {
    fn auto_end_window(&self) -> Duration {
        Duration::seconds(self.config.auto_end_after_secs() as i64)
    }

    /// 加入后若只有助手一人，开始计时
    pub(crate) async fn arm_auto_end_after_join(
        &self,
        chat_id: ChatId,
        account: AccountId,
        session: u64,
    ) {
        if !self.config.auto_end_enabled() {
            return;
        }
        match self.driver.participants(account, chat_id).await {
            Ok(participants) if participants.len() == 1 => {
                let deadline = Utc::now() + self.auto_end_window();
                self.store.with_session(chat_id, session, |q| {
                    q.auto_end_deadline = Some(deadline);
                });
                info!("[AutoEnd] chat {} is empty, leaving at {}", chat_id, deadline);
            }
            Ok(_) => {}
            Err(e) => warn!("[AutoEnd] failed to sample participants of chat {}: {}", chat_id, e),
        }
    }

    /// 重新采样参与者数量：多于 1 人清除截止时间，
    /// 不多于 1 人时设置截止时间，已过期则停止播放
    pub async fn check_auto_end(&self, chat_id: ChatId) -> Result<AutoEndStatus, AppError> {
        if !self.config.auto_end_enabled() {
            return Ok(AutoEndStatus::Disabled);
        }
        let Ok((session, account)) = self.joined_account(chat_id) else {
            return Ok(AutoEndStatus::NotJoined);
        };
        let count = match self.driver.participants(account, chat_id).await {
            Ok(participants) => participants.len(),
            Err(e) => {
                warn!("[AutoEnd] failed to sample participants of chat {}: {}", chat_id, e);
                return Ok(AutoEndStatus::Unknown);
            }
        };

        let now = Utc::now();
        let window = self.auto_end_window();
        let decision = self.store.with_session(chat_id, session, |q| {
            if count > 1 {
                q.auto_end_deadline = None;
                return Decision::Keep(AutoEndStatus::Listening);
            }
            match q.auto_end_deadline {
                None => {
                    let deadline = now + window;
                    q.auto_end_deadline = Some(deadline);
                    Decision::Keep(AutoEndStatus::Armed(deadline))
                }
                Some(deadline) if now >= deadline => Decision::Stop,
                Some(deadline) => Decision::Keep(AutoEndStatus::Pending(deadline)),
            }
        });

        match decision {
            None => Ok(AutoEndStatus::NotJoined),
            Some(Decision::Keep(status)) => Ok(status),
            Some(Decision::Stop) => {
                info!("[AutoEnd] no listeners in chat {}, leaving", chat_id);
                self.teardown(chat_id, Some(session)).await?;
                self.notify(chat_id, Notice::AutoEnded).await;
                Ok(AutoEndStatus::Ended)
            }
        }
    }

    /// 定时巡检所有已加入的会话，返回因此退出的会话数
    pub async fn sweep_auto_end(&self) -> usize {
        let mut ended = 0;
        for chat_id in self.active_chats() {
            match self.check_auto_end(chat_id).await {
                Ok(AutoEndStatus::Ended) => ended += 1,
                Ok(_) => {}
                Err(e) => warn!("[AutoEnd] check of chat {} failed: {}", chat_id, e),
            }
        }
        ended
    }
}
