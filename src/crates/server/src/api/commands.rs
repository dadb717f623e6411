use crate::api::dto::{
    ActiveChatsResponse, AutoEndResponse, LoopBody, LoopResponse, ParticipantsResponse, PingResponse, PlayBody,
    PlayResponse, QueueDto, SeekBody, SeekResponse, SkipBody, SpeedBody, TransitionResponse,
};
use crate::api::error::ApiError;
use crate::AppState;
use actix_web::{get, post, web, HttpResponse};
use application::error::AppError;
use application::playback::PlayRequest;
use chrono::Utc;
use domain::speed::PlaybackSpeed;
use domain::value::ChatId;
use log::{error, info};

/// 每条会话命令执行前先做一次自动退出检查
async fn check_auto_end(state: &AppState, chat_id: ChatId) {
    if let Err(e) = state.controller.check_auto_end(chat_id).await {
        error!("Auto-end check failed for chat {}: {}", chat_id, e);
    }
}

fn chat(path: web::Path<i64>) -> ChatId {
    ChatId::from(path.into_inner())
}

#[post("/chats/{chat_id}/play")]
pub async fn play(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<PlayBody>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let body = body.into_inner();
    let request = PlayRequest {
        query: body.query,
        video: body.video,
        requested_by: body.requested_by,
        origin_chat_id: body.origin_chat_id.map(ChatId::from).unwrap_or(chat_id),
    };
    let outcome = state.controller.play(chat_id, request).await?;
    Ok(HttpResponse::Ok().json(PlayResponse::from(outcome)))
}

#[post("/chats/{chat_id}/next")]
pub async fn next(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let outcome = state.controller.next_track(chat_id).await?;
    Ok(HttpResponse::Ok().json(TransitionResponse::from(outcome)))
}

#[post("/chats/{chat_id}/stop")]
pub async fn stop(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    state.controller.stop(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/force-stop")]
pub async fn force_stop(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    state.controller.force_stop(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/reboot")]
pub async fn reboot(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    state.controller.reboot(chat_id).await?;
    info!("[Api] rebooted chat {}", chat_id);
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/skip")]
pub async fn skip(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<SkipBody>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let body = body.into_inner();
    if body.locator.trim().is_empty() {
        return Err(ApiError::BadRequest("locator must not be empty".to_string()));
    }
    state
        .controller
        .skip(chat_id, body.locator.trim(), body.video)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/seek")]
pub async fn seek(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<SeekBody>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let position = state.controller.seek_by(chat_id, body.offset).await?;
    Ok(HttpResponse::Ok().json(SeekResponse { position }))
}

#[post("/chats/{chat_id}/speed")]
pub async fn speed(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<SpeedBody>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let body = body.into_inner();
    let speed = PlaybackSpeed::from_f32(body.speed);
    if (speed.as_f32() - body.speed).abs() > f32::EPSILON {
        return Err(ApiError::BadRequest(format!(
            "unsupported speed {}, expected one of 0.5, 0.75, 1.0, 1.5, 2.0",
            body.speed
        )));
    }
    let locator = match body.locator {
        Some(locator) => locator,
        None => state
            .controller
            .queue_status(chat_id)
            .and_then(|q| q.head().map(|h| h.locator.clone()))
            .ok_or_else(|| ApiError::App(AppError::NotJoined(chat_id)))?,
    };
    state.controller.change_speed(chat_id, &locator, speed).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/loop")]
pub async fn set_loop(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<LoopBody>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    let count = state.controller.set_loop(chat_id, body.count)?;
    Ok(HttpResponse::Ok().json(LoopResponse { count }))
}

#[post("/chats/{chat_id}/pause")]
pub async fn pause(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    state.controller.pause(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/resume")]
pub async fn resume(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    state.controller.resume(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/mute")]
pub async fn mute(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    state.controller.mute(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/chats/{chat_id}/unmute")]
pub async fn unmute(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    check_auto_end(&state, chat_id).await;
    state.controller.unmute(chat_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// 手动触发一次自动退出检查，返回当前状态
#[post("/chats/{chat_id}/auto-end")]
pub async fn auto_end(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    let status = state.controller.check_auto_end(chat_id).await?;
    Ok(HttpResponse::Ok().json(AutoEndResponse::from(status)))
}

#[get("/chats/{chat_id}/queue")]
pub async fn queue(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    match state.controller.queue_status(chat_id) {
        Some(q) => Ok(HttpResponse::Ok().json(QueueDto::from_queue(&q, Utc::now()))),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

#[get("/chats/{chat_id}/participants")]
pub async fn participants(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = chat(path);
    let participants = state.controller.participants(chat_id).await?;
    Ok(HttpResponse::Ok().json(ParticipantsResponse {
        participants: participants.into_iter().map(|p| p.as_i64()).collect(),
    }))
}

#[get("/chats/active")]
pub async fn active_chats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ActiveChatsResponse {
        chats: state
            .controller
            .active_chats()
            .into_iter()
            .map(|c| c.as_i64())
            .collect(),
        video_chats: state
            .controller
            .active_video_chats()
            .into_iter()
            .map(|c| c.as_i64())
            .collect(),
    })
}

#[get("/ping")]
pub async fn ping(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ping_ms = state.controller.ping().await?;
    Ok(HttpResponse::Ok().json(PingResponse { ping_ms }))
}
