use application::error::AppError;
use application::event::event_bus::EventEnvelope;
use application::event::event_bus::{ErasedHandler, EventBus, Handler};
use async_trait::async_trait;
use futures::future::join_all;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 桥接，将 Handler<E> 擦除为 ErasedHandler
struct HandlerWrapper<E> {
    inner: Arc<dyn Handler<E>>,
}

#[async_trait]
impl<E> ErasedHandler for HandlerWrapper<E>
where
    E: Send + Sync + 'static,
{
    async fn handle_erased(&self, event: &(dyn Any + Send + Sync)) {
        match event.downcast_ref::<EventEnvelope<E>>() {
            Some(e) => self.inner.handle(e).await,
            None => log::error!("[EventBus] payload is not {}", type_name::<E>()),
        }
    }
}

type HandlerMap = HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>;

/// 进程内事件总线，按事件类型分发
#[derive(Clone)]
pub struct InMemoryEventBus {
    handlers: Arc<RwLock<HandlerMap>>,
    /// 为 true 时 publish 不等待处理器完成
    fire_and_forget: bool,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            fire_and_forget: false,
        }
    }

    /// 驱动回调线程上使用：处理器里可能再次调用驱动，不能阻塞上报方
    pub fn new_async() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            fire_and_forget: true,
        }
    }

    pub async fn handler_count<E: 'static>(&self) -> usize {
        self.handlers
            .read()
            .await
            .get(&TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish<E>(&self, event: EventEnvelope<E>) -> Result<(), AppError>
    where
        E: Send + Sync + 'static,
    {
        let handlers: Option<Vec<Arc<dyn ErasedHandler>>> = {
            let guard = self.handlers.read().await;
            guard.get(&TypeId::of::<E>()).cloned()
        };
        let Some(list) = handlers else {
            log::debug!(
                "[EventBus] no handler for {} ({})",
                type_name::<E>(),
                event.correlation_id
            );
            return Ok(());
        };

        if self.fire_and_forget {
            let event = Arc::new(event);
            tokio::spawn(async move {
                join_all(list.iter().map(|h| h.handle_erased(event.as_ref()))).await;
            });
        } else {
            join_all(list.iter().map(|h| h.handle_erased(&event))).await;
        }
        Ok(())
    }

    async fn subscribe<E>(&mut self, handler: Arc<dyn Handler<E>>)
    where
        E: Send + Sync + 'static,
    {
        let wrapper = Arc::new(HandlerWrapper { inner: handler }) as Arc<dyn ErasedHandler>;
        self.handlers
            .write()
            .await
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::value::{AccountId, ChatId};
    use domain::voice_call::{CallEvent, CallEventKind, EndedTrack};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CallEventKind>>,
    }

    #[async_trait]
    impl Handler<CallEvent> for Recorder {
        async fn handle(&self, event: &EventEnvelope<CallEvent>) {
            self.seen.lock().unwrap().push(event.payload.kind);
        }
    }

    fn ended(chat: i64) -> EventEnvelope<CallEvent> {
        EventEnvelope::new(CallEvent {
            account: AccountId::new(1),
            chat_id: ChatId::new(chat),
            kind: CallEventKind::StreamEnded(EndedTrack::Audio),
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let mut bus = InMemoryEventBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe::<CallEvent>(first.clone()).await;
        bus.subscribe::<CallEvent>(second.clone()).await;
        assert_eq!(bus.handler_count::<CallEvent>().await, 2);

        bus.publish(ended(-100)).await.unwrap();

        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert_eq!(second.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_events_of_other_types_are_not_delivered() {
        let mut bus = InMemoryEventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<CallEvent>(recorder.clone()).await;

        bus.publish(EventEnvelope::new("unrelated".to_string()))
            .await
            .unwrap();

        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_bus_does_not_wait_for_handlers() {
        let mut bus = InMemoryEventBus::new_async();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<CallEvent>(recorder.clone()).await;

        bus.publish(ended(-200)).await.unwrap();
        for _ in 0..50 {
            if !recorder.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            recorder.seen.lock().unwrap().as_slice(),
            &[CallEventKind::StreamEnded(EndedTrack::Audio)]
        );
    }
}
