use crate::event::event_bus::{EventEnvelope, Handler};
use crate::playback::controller::PlaybackController;
use domain::voice_call::CallEvent;
use log::error;
use std::sync::Arc;

/// 语音通话生命周期事件统一入口，按事件标签分派给播放控制器
#[derive(Clone)]
pub struct CallEventHandler {
    controller: Arc<PlaybackController>,
}

impl CallEventHandler {
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        Self { controller }
    }
}

#[async_trait::async_trait]
impl Handler<CallEvent> for CallEventHandler {
    async fn handle(&self, envelope: &EventEnvelope<CallEvent>) {
        let evt = &envelope.payload;
        if let Err(e) = self.controller.on_call_event(evt).await {
            error!(
                "Failed to handle call event {} for chat {}, correlation_id:{}, error:{}",
                evt.kind.as_str(),
                evt.chat_id,
                envelope.correlation_id,
                e
            );
        }
    }
}
