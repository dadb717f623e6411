use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use uuid::Uuid;

/// 事件信封
#[derive(Debug, Clone)]
pub struct EventEnvelope<T> {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
    // 日志里串联一次事件处理用
    pub correlation_id: CorrelationId,
}

impl<T> EventEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
            correlation_id: CorrelationId::new(),
        }
    }
}

#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 强类型 Handler
#[async_trait]
pub trait Handler<E>: Send + Sync {
    async fn handle(&self, event: &EventEnvelope<E>);
}

/// 类型擦除 Handler，用 Any 做事件擦除
#[async_trait]
pub trait ErasedHandler: Send + Sync {
    async fn handle_erased(&self, event: &(dyn Any + Send + Sync));
}

/// 事件总线抽象
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish<E>(&self, event: EventEnvelope<E>) -> Result<(), AppError>
    where
        E: Send + Sync + 'static;

    async fn subscribe<E>(&mut self, handler: Arc<dyn Handler<E>>)
    where
        E: Send + Sync + 'static;
}
