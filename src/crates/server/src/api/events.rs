use crate::api::dto::CallEventBody;
use crate::api::error::ApiError;
use crate::AppState;
use actix_web::{post, web, HttpResponse};
use application::event::event_bus::{EventBus, EventEnvelope};
use log::debug;

/// 桥接服务上报通话事件，投递到事件总线后立即返回
#[post("/events")]
pub async fn ingest(
    state: web::Data<AppState>,
    body: web::Json<CallEventBody>,
) -> Result<HttpResponse, ApiError> {
    let kind = body.kind.clone();
    let event = body
        .into_inner()
        .into_event()
        .ok_or_else(|| ApiError::BadRequest(format!("unknown event kind: {}", kind)))?;
    let envelope = EventEnvelope::new(event);
    debug!(
        "[Events] {} {} from account {} in chat {}",
        envelope.id,
        envelope.payload.kind.as_str(),
        envelope.payload.account,
        envelope.payload.chat_id
    );
    state.event_bus.publish(envelope).await?;
    Ok(HttpResponse::Accepted().finish())
}
