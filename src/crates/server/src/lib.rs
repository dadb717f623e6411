pub mod api;
pub mod consts;
pub mod middleware;

use application::config::PlaybackConfig;
use application::event::call_event_handler::CallEventHandler;
use application::event::event_bus::EventBus;
use application::playback::{AssistantPool, PlaybackController};
use application::shared::WorkerPool;
use domain::notifier::Notifier;
use domain::resolver::MediaResolver;
use domain::transcoding::SpeedTranscoder;
use domain::voice_call::{CallEvent, VoiceCallDriver};
use infra::config::AppConfigImpl;
use infra::{BridgeClient, FfmpegSpeedTranscoder, HttpFetcher, InMemoryEventBus, YtDlpResolver};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct AppState {
    pub controller: Arc<PlaybackController>,
    pub event_bus: InMemoryEventBus,
    /// 为 None 时不校验请求令牌
    pub api_token: Option<String>,
}

impl AppState {
    /// 按配置装配桥接客户端、解析器与转码器
    pub fn new(app_cfg: &AppConfigImpl) -> Result<Self, String> {
        let assistants = app_cfg.assistants();
        if assistants.is_empty() {
            return Err("no assistant accounts configured (APP__ASSISTANTS)".to_string());
        }

        let media = app_cfg.media();
        std::fs::create_dir_all(media.download_path())
            .map_err(|e| format!("cannot create {}: {}", media.download_dir, e))?;
        std::fs::create_dir_all(media.playback_path())
            .map_err(|e| format!("cannot create {}: {}", media.playback_dir, e))?;

        // yt-dlp、ffprobe 与 ffmpeg 共用同一组并发额度
        let heavy_jobs = WorkerPool::new(media.max_heavy_jobs);
        let fetcher = HttpFetcher::new(
            Duration::from_secs(media.fetch_timeout_secs),
            media.fetch_attempts,
            Duration::from_millis(media.fetch_backoff_ms),
        )
        .map_err(|e| e.to_string())?;
        let resolver = Arc::new(YtDlpResolver::new(
            media.yt_dlp_path.clone(),
            media.ffprobe_path.clone(),
            media.download_path(),
            media.cookies_file.clone(),
            heavy_jobs.clone(),
            fetcher,
        ));
        let transcoder = Arc::new(FfmpegSpeedTranscoder::new(
            media.ffmpeg_path.clone(),
            media.ffprobe_path.clone(),
            media.playback_path(),
            heavy_jobs,
        ));

        let bridge_cfg = app_cfg.bridge();
        let bridge = Arc::new(BridgeClient::new(
            &bridge_cfg.base_url,
            Duration::from_secs(bridge_cfg.timeout_secs),
            bridge_cfg.token.clone(),
        )?);
        info!(
            "Voice bridge at {} with {} assistant account(s)",
            bridge_cfg.base_url,
            assistants.len()
        );

        Ok(Self::from_parts(
            AssistantPool::new(assistants),
            bridge.clone(),
            resolver,
            bridge,
            transcoder,
            Arc::new(app_cfg.clone()),
            InMemoryEventBus::new_async(),
            app_cfg.server().api_token,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        pool: AssistantPool,
        driver: Arc<dyn VoiceCallDriver>,
        resolver: Arc<dyn MediaResolver>,
        notifier: Arc<dyn Notifier>,
        transcoder: Arc<dyn SpeedTranscoder>,
        config: Arc<dyn PlaybackConfig>,
        event_bus: InMemoryEventBus,
        api_token: Option<String>,
    ) -> Self {
        let controller = Arc::new(PlaybackController::new(
            pool, driver, resolver, notifier, transcoder, config,
        ));
        Self {
            controller,
            event_bus,
            api_token,
        }
    }
}

/// 注册通话事件处理器
pub async fn setup_event_bus(state: &mut AppState) {
    let handler = Arc::new(CallEventHandler::new(state.controller.clone()));
    state.event_bus.subscribe::<CallEvent>(handler).await;
}

/// 定期检查所有已加入的会话，无人收听超时的自动退出
pub fn spawn_auto_end_sweep(controller: Arc<PlaybackController>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let ended = controller.sweep_auto_end().await;
            if ended > 0 {
                info!("[AutoEnd] sweep left {} idle chat(s)", ended);
            }
        }
    })
}

