use dashmap::DashMap;
use domain::queue::{ChatQueue, QueueEntry};
use domain::value::ChatId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 单个会话的全部运行时状态：队列本身加上换曲互斥锁
struct ChatSlot {
    queue: ChatQueue,
    transition_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub session: u64,
    /// 0 表示新建了队列，需要加入语音聊天
    pub position: usize,
    pub created: bool,
}

/// 进程内的会话队列表。
///
/// 所有闭包都在 DashMap 分片锁内同步执行，调用方不能在闭包里 await，
/// 也不能在持有返回的引用时访问同一个 store。
pub struct QueueStore {
    slots: DashMap<ChatId, ChatSlot>,
    next_session: AtomicU64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// 入队；会话不存在时新建队列并分配新的会话号
    pub fn enqueue(&self, chat_id: ChatId, entry: QueueEntry) -> Enqueued {
        let mut created = false;
        let mut slot = self.slots.entry(chat_id).or_insert_with(|| {
            created = true;
            let session = self.next_session.fetch_add(1, Ordering::SeqCst);
            ChatSlot {
                queue: ChatQueue::new(chat_id, session, entry.clone()),
                transition_lock: Arc::new(Mutex::new(())),
            }
        });
        let position = if created {
            0
        } else {
            slot.queue.push(entry)
        };
        Enqueued {
            session: slot.queue.session,
            position,
            created,
        }
    }

    pub fn snapshot(&self, chat_id: ChatId) -> Option<ChatQueue> {
        self.slots.get(&chat_id).map(|slot| slot.queue.clone())
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.slots.contains_key(&chat_id)
    }

    pub fn is_session(&self, chat_id: ChatId, session: u64) -> bool {
        self.slots
            .get(&chat_id)
            .map(|slot| slot.queue.session == session)
            .unwrap_or(false)
    }

    pub fn with_queue<R>(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatQueue) -> R) -> Option<R> {
        self.slots.get_mut(&chat_id).map(|mut slot| f(&mut slot.queue))
    }

    /// 仅当队列仍是 `session` 那一轮时执行，用于识别被停止后重建的队列
    pub fn with_session<R>(
        &self,
        chat_id: ChatId,
        session: u64,
        f: impl FnOnce(&mut ChatQueue) -> R,
    ) -> Option<R> {
        let mut slot = self.slots.get_mut(&chat_id)?;
        if slot.queue.session != session {
            return None;
        }
        Some(f(&mut slot.queue))
    }

    pub fn transition_lock(&self, chat_id: ChatId) -> Option<Arc<Mutex<()>>> {
        self.slots
            .get(&chat_id)
            .map(|slot| slot.transition_lock.clone())
    }

    pub fn remove(&self, chat_id: ChatId) -> Option<ChatQueue> {
        self.slots.remove(&chat_id).map(|(_, slot)| slot.queue)
    }

    pub fn remove_session(&self, chat_id: ChatId, session: u64) -> Option<ChatQueue> {
        self.slots
            .remove_if(&chat_id, |_, slot| slot.queue.session == session)
            .map(|(_, slot)| slot.queue)
    }

    pub fn chat_ids(&self) -> Vec<ChatId> {
        self.slots.iter().map(|slot| *slot.key()).collect()
    }

    /// 已加入语音聊天的会话
    pub fn active_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self
            .slots
            .iter()
            .filter(|slot| slot.queue.is_joined())
            .map(|slot| *slot.key())
            .collect();
        chats.sort();
        chats
    }

    /// 已加入且正在推视频的会话
    pub fn active_video_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self
            .slots
            .iter()
            .filter(|slot| slot.queue.is_joined() && slot.queue.is_video())
            .map(|slot| *slot.key())
            .collect();
        chats.sort();
        chats
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}
