use crate::error::AppError;
use dashmap::DashMap;
use domain::value::{AccountId, ChatId};

/// 助手账号池：账号数量由配置决定，每个会话绑定一个账号，
/// 新会话分配给当前服务会话数最少的账号（并列时取配置顺序靠前者）。
pub struct AssistantPool {
    accounts: Vec<AccountId>,
    assignments: DashMap<ChatId, AccountId>,
}

impl AssistantPool {
    pub fn new(accounts: Vec<AccountId>) -> Self {
        Self {
            accounts,
            assignments: DashMap::new(),
        }
    }

    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }

    pub fn assigned(&self, chat_id: ChatId) -> Option<AccountId> {
        self.assignments.get(&chat_id).map(|a| *a)
    }

    pub fn assign(&self, chat_id: ChatId) -> Result<AccountId, AppError> {
        if let Some(account) = self.assigned(chat_id) {
            return Ok(account);
        }
        let candidate = self.least_loaded().ok_or_else(|| {
            AppError::DriverFatal("no assistant account configured".to_string())
        })?;
        // 统计负载时不能持有 entry 的分片锁，这里只做插入
        let account = *self.assignments.entry(chat_id).or_insert(candidate);
        Ok(account)
    }

    pub fn release(&self, chat_id: ChatId) -> Option<AccountId> {
        self.assignments.remove(&chat_id).map(|(_, account)| account)
    }

    /// 未分配账号的会话在退出时使用的账号
    pub fn candidate(&self) -> Option<AccountId> {
        self.least_loaded()
    }

    pub fn load_of(&self, account: AccountId) -> usize {
        self.assignments
            .iter()
            .filter(|entry| *entry.value() == account)
            .count()
    }

    fn least_loaded(&self) -> Option<AccountId> {
        self.accounts
            .iter()
            .copied()
            .min_by_key(|account| self.load_of(*account))
    }
}
