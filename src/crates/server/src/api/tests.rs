use super::configure_service;
use crate::{setup_event_bus, AppState};
use actix_web::{http::StatusCode, test, web, App};
use application::playback::AssistantPool;
use async_trait::async_trait;
use domain::notifier::{Notice, Notifier, NotifyError, NowPlayingCard};
use domain::queue::{ExternalId, SourceKind};
use domain::resolver::{MediaResolver, ResolveError, ResolvedTrack, TrackMetadata};
use domain::speed::PlaybackSpeed;
use domain::stream::StreamDescriptor;
use domain::transcoding::{SpeedTranscoder, TranscodeError};
use domain::value::{AccountId, ChatId, MessageId, ParticipantId};
use domain::voice_call::{VoiceCallDriver, VoiceCallError};
use infra::{AppConfigImpl, InMemoryEventBus};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const ACCOUNT: AccountId = AccountId::new(7);
const CHAT: i64 = -1001;

#[derive(Default)]
struct Bridge {
    leaves: Mutex<Vec<i64>>,
    notices: Mutex<Vec<Notice>>,
}

#[async_trait]
impl VoiceCallDriver for Bridge {
    async fn join(&self, _: AccountId, _: ChatId, _: &StreamDescriptor) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn change_stream(
        &self,
        _: AccountId,
        _: ChatId,
        _: &StreamDescriptor,
    ) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn leave(&self, _: AccountId, chat_id: ChatId) -> Result<(), VoiceCallError> {
        self.leaves.lock().unwrap().push(chat_id.as_i64());
        Ok(())
    }

    async fn pause(&self, _: AccountId, _: ChatId) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn resume(&self, _: AccountId, _: ChatId) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn mute(&self, _: AccountId, _: ChatId) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn unmute(&self, _: AccountId, _: ChatId) -> Result<(), VoiceCallError> {
        Ok(())
    }

    async fn participants(
        &self,
        _: AccountId,
        _: ChatId,
    ) -> Result<Vec<ParticipantId>, VoiceCallError> {
        Ok(vec![ParticipantId::new(7), ParticipantId::new(11), ParticipantId::new(12)])
    }

    async fn ping(&self, _: AccountId) -> Result<f64, VoiceCallError> {
        Ok(42.0)
    }
}

#[async_trait]
impl Notifier for Bridge {
    async fn notify(&self, _: ChatId, notice: Notice) -> Result<MessageId, NotifyError> {
        self.notices.lock().unwrap().push(notice);
        Ok(MessageId::new(1))
    }

    async fn now_playing(&self, _: ChatId, _: &NowPlayingCard) -> Result<MessageId, NotifyError> {
        Ok(MessageId::new(2))
    }

    async fn delete(&self, _: ChatId, _: MessageId) -> Result<(), NotifyError> {
        Ok(())
    }
}

struct Library;

#[async_trait]
impl MediaResolver for Library {
    async fn resolve(&self, query: &str, _: bool) -> Result<ResolvedTrack, ResolveError> {
        let Some(name) = query.strip_prefix("file:") else {
            return Err(ResolveError::NotFound(query.to_string()));
        };
        Ok(ResolvedTrack {
            metadata: TrackMetadata {
                title: format!("Song {}", name),
                duration_seconds: 180,
                thumbnail: None,
                external_id: ExternalId::None,
                link: String::new(),
                is_live: false,
            },
            source_kind: SourceKind::Generic,
            locator: format!("/music/{}.mp3", name),
        })
    }

    async fn live_url(&self, video_id: &str, _: bool) -> Result<String, ResolveError> {
        Err(ResolveError::NotFound(video_id.to_string()))
    }

    async fn download(&self, video_id: &str, _: bool) -> Result<String, ResolveError> {
        Err(ResolveError::NotFound(video_id.to_string()))
    }

    async fn thumbnail(&self, video_id: &str) -> Result<String, ResolveError> {
        Err(ResolveError::NotFound(video_id.to_string()))
    }
}

struct NoTranscode;

#[async_trait]
impl SpeedTranscoder for NoTranscode {
    async fn speed_copy(&self, source: &str, _: PlaybackSpeed) -> Result<String, TranscodeError> {
        Err(TranscodeError::SourceMissing(source.to_string()))
    }

    async fn probe_duration(&self, _: &str) -> Result<u64, TranscodeError> {
        Ok(180)
    }
}

fn state(bridge: Arc<Bridge>, api_token: Option<&str>) -> AppState {
    AppState::from_parts(
        AssistantPool::new(vec![ACCOUNT]),
        bridge.clone(),
        Arc::new(Library),
        bridge,
        Arc::new(NoTranscode),
        Arc::new(AppConfigImpl::default()),
        InMemoryEventBus::new(),
        api_token.map(str::to_string),
    )
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(configure_service),
        )
        .await
    };
}

fn play(query: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri(&format!("/api/chats/{}/play", CHAT))
        .set_json(json!({ "query": query, "requested_by": "alice" }))
}

#[actix_web::test]
async fn test_play_then_queue_reports_entries() {
    let app = app!(state(Arc::new(Bridge::default()), None));

    let first: Value = test::call_and_read_body_json(&app, play("file:a").to_request()).await;
    assert_eq!(first["outcome"], "started");
    let second: Value = test::call_and_read_body_json(&app, play("file:b").to_request()).await;
    assert_eq!(second["outcome"], "queued");
    assert_eq!(second["position"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/chats/{}/queue", CHAT))
        .to_request();
    let queue: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(queue["state"], "playing");
    assert_eq!(queue["account"], 7);
    let titles: Vec<&str> = queue["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Song a", "Song b"]);

    let req = test::TestRequest::get().uri("/api/chats/active").to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(active["chats"], json!([CHAT]));
    assert_eq!(active["video_chats"], json!([]));
}

#[actix_web::test]
async fn test_errors_map_to_status_codes() {
    let app = app!(state(Arc::new(Bridge::default()), None));

    let resp = test::call_service(&app, play("   ").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, play("nothing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");

    let req = test::TestRequest::post()
        .uri(&format!("/api/chats/{}/pause", CHAT))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/chats/{}/queue", CHAT))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_loop_and_speed_validation() {
    let app = app!(state(Arc::new(Bridge::default()), None));
    test::call_service(&app, play("file:a").to_request()).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/chats/{}/loop", CHAT))
        .set_json(json!({ "count": 3 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 3);

    let req = test::TestRequest::post()
        .uri(&format!("/api/chats/{}/loop", CHAT))
        .set_json(json!({ "count": 11 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/chats/{}/speed", CHAT))
        .set_json(json!({ "speed": 1.25 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_stream_ended_event_exhausts_single_entry_queue() {
    let bridge = Arc::new(Bridge::default());
    let mut app_state = state(bridge.clone(), None);
    setup_event_bus(&mut app_state).await;
    let app = app!(app_state);
    test::call_service(&app, play("file:a").to_request()).await;

    let req = test::TestRequest::post()
        .uri("/api/events")
        .set_json(json!({ "account": 7, "chat_id": CHAT, "kind": "stream_ended" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    assert_eq!(*bridge.leaves.lock().unwrap(), vec![CHAT]);
    let req = test::TestRequest::get()
        .uri(&format!("/api/chats/{}/queue", CHAT))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/events")
        .set_json(json!({ "account": 7, "chat_id": CHAT, "kind": "exploded" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_token_is_required_when_configured() {
    let app = app!(state(Arc::new(Bridge::default()), Some("s3cret")));

    let req = test::TestRequest::get().uri("/api/ping").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("Authorization", "Bearer s3cret"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ping_ms"], 42.0);
}

#[actix_web::test]
async fn test_reboot_clears_state_and_notifies() {
    let bridge = Arc::new(Bridge::default());
    let app = app!(state(bridge.clone(), None));
    test::call_service(&app, play("file:a").to_request()).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/chats/{}/reboot", CHAT))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(bridge.notices.lock().unwrap().contains(&Notice::StateReset));

    let req = test::TestRequest::get().uri("/api/chats/active").to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(active["chats"], json!([]));
}
