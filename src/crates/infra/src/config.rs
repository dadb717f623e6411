use application::config::PlaybackConfig;
use config::{Config, Environment, File};
use domain::value::AccountId;
use dotenvy::dotenv;
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    /// 助手账号，顺序即分配优先级
    assistants: Vec<i64>,
    server: RawServerConfig,
    bridge: RawBridgeConfig,
    playback: RawPlaybackConfig,
    images: RawImageConfig,
    media: RawMediaConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            assistants: Vec::new(),
            server: RawServerConfig::default(),
            bridge: RawBridgeConfig::default(),
            playback: RawPlaybackConfig::default(),
            images: RawImageConfig::default(),
            media: RawMediaConfig::default(),
        }
    }
}

/// 服务器配置（原始配置）
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawServerConfig {
    /// 监听地址
    host: String,
    /// 监听端口
    port: u16,
    /// 访问令牌，为空时不校验
    api_token: String,
}

impl Default for RawServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5533,
            api_token: String::new(),
        }
    }
}

/// 语音桥接服务（原始配置）
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawBridgeConfig {
    base_url: String,
    timeout_secs: u64,
    /// 为空时不带 Authorization 头
    token: String,
}

impl Default for RawBridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            timeout_secs: 30,
            token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawPlaybackConfig {
    auto_end: bool,
    auto_end_after_secs: u64,
    /// 定时巡检间隔，0 表示只在处理命令时检查
    auto_end_sweep_secs: u64,
    change_stream_attempts: u32,
    change_stream_backoff_ms: u64,
    bot_username: String,
    support_chat: String,
}

impl Default for RawPlaybackConfig {
    fn default() -> Self {
        Self {
            auto_end: true,
            auto_end_after_secs: 60,
            auto_end_sweep_secs: 30,
            change_stream_attempts: 3,
            change_stream_backoff_ms: 1000,
            bot_username: String::new(),
            support_chat: "https://t.me/BillaCore".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawImageConfig {
    stream: String,
    telegram_audio: String,
    telegram_video: String,
    soundcloud: String,
    youtube: String,
}

impl Default for RawImageConfig {
    fn default() -> Self {
        Self {
            stream: "https://graph.org/file/efbb051b7aad4b2ad7d37-c8e4ddd2960c91be07.jpg"
                .to_string(),
            telegram_audio: "https://graph.org/file/4d8555e1bc7b2c05b06db-e84406267d9b9a00f4.jpg"
                .to_string(),
            telegram_video: "https://graph.org/file/4870908a752d7edf05551-80a5cd8a0e69b33e39.jpg"
                .to_string(),
            soundcloud: "https://graph.org/file/06d7e3bc7657550efb357-f248fc40e11e128403.jpg"
                .to_string(),
            youtube: "https://graph.org/file/580f7c0c0f15dc22a0ca6-2891d428a41e4dbd52.jpg"
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawMediaConfig {
    ffmpeg_path: String,
    ffprobe_path: String,
    yt_dlp_path: String,
    download_dir: String,
    /// 倍速副本目录，按倍速分子目录
    playback_dir: String,
    cookies_file: String,
    max_heavy_jobs: usize,
    fetch_attempts: u32,
    fetch_backoff_ms: u64,
    fetch_timeout_secs: u64,
}

impl Default for RawMediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            yt_dlp_path: "yt-dlp".to_string(),
            download_dir: "./data/downloads".to_string(),
            playback_dir: "./data/playback".to_string(),
            cookies_file: String::new(),
            max_heavy_jobs: 5,
            fetch_attempts: 3,
            fetch_backoff_ms: 500,
            fetch_timeout_secs: 40,
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,
}

/// 语音桥接服务配置
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub auto_end: bool,
    pub auto_end_after_secs: u64,
    pub auto_end_sweep_secs: u64,
    pub change_stream_attempts: u32,
    pub change_stream_backoff_ms: u64,
    pub bot_username: String,
    pub support_chat: String,
}

/// 各来源的默认封面
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub stream: String,
    pub telegram_audio: String,
    pub telegram_video: String,
    pub soundcloud: String,
    pub youtube: String,
}

/// 外部工具与媒体目录
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub yt_dlp_path: String,
    pub download_dir: String,
    pub playback_dir: String,
    pub cookies_file: Option<String>,
    pub max_heavy_jobs: usize,
    pub fetch_attempts: u32,
    pub fetch_backoff_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl MediaConfig {
    pub fn download_path(&self) -> PathBuf {
        PathBuf::from(&self.download_dir)
    }

    pub fn playback_path(&self) -> PathBuf {
        PathBuf::from(&self.playback_dir)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// 写锁只在加载时持有，锁中毒时沿用旧值
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
pub struct AppConfigImpl {
    pub assistants: Arc<RwLock<Vec<AccountId>>>,
    pub server: Arc<RwLock<ServerConfig>>,
    pub bridge: Arc<RwLock<BridgeConfig>>,
    pub playback: Arc<RwLock<PlaybackSettings>>,
    pub images: Arc<RwLock<ImageConfig>>,
    pub media: Arc<RwLock<MediaConfig>>,
}

impl AppConfigImpl {
    fn new(data: RawConfig) -> Self {
        let assistants = data.assistants.into_iter().map(AccountId::from).collect();
        let server = ServerConfig {
            host: data.server.host,
            port: data.server.port,
            api_token: non_empty(data.server.api_token),
        };
        let bridge = BridgeConfig {
            base_url: data.bridge.base_url.trim_end_matches('/').to_string(),
            timeout_secs: data.bridge.timeout_secs,
            token: non_empty(data.bridge.token),
        };
        let playback = PlaybackSettings {
            auto_end: data.playback.auto_end,
            auto_end_after_secs: data.playback.auto_end_after_secs,
            auto_end_sweep_secs: data.playback.auto_end_sweep_secs,
            change_stream_attempts: data.playback.change_stream_attempts.max(1),
            change_stream_backoff_ms: data.playback.change_stream_backoff_ms,
            bot_username: data.playback.bot_username.trim_start_matches('@').to_string(),
            support_chat: data.playback.support_chat,
        };
        let images = ImageConfig {
            stream: data.images.stream,
            telegram_audio: data.images.telegram_audio,
            telegram_video: data.images.telegram_video,
            soundcloud: data.images.soundcloud,
            youtube: data.images.youtube,
        };
        let media = MediaConfig {
            ffmpeg_path: data.media.ffmpeg_path,
            ffprobe_path: data.media.ffprobe_path,
            yt_dlp_path: data.media.yt_dlp_path,
            download_dir: data.media.download_dir,
            playback_dir: data.media.playback_dir,
            cookies_file: non_empty(data.media.cookies_file),
            max_heavy_jobs: data.media.max_heavy_jobs.max(1),
            fetch_attempts: data.media.fetch_attempts.max(1),
            fetch_backoff_ms: data.media.fetch_backoff_ms,
            fetch_timeout_secs: data.media.fetch_timeout_secs,
        };
        AppConfigImpl {
            assistants: Arc::new(RwLock::new(assistants)),
            server: Arc::new(RwLock::new(server)),
            bridge: Arc::new(RwLock::new(bridge)),
            playback: Arc::new(RwLock::new(playback)),
            images: Arc::new(RwLock::new(images)),
            media: Arc::new(RwLock::new(media)),
        }
    }

    pub fn load() -> Result<AppConfigImpl, Box<dyn Error>> {
        dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("assistants")
                    .try_parsing(true),
            )
            .build()?;

        let raw: RawConfig = config.try_deserialize()?; // serde 自动填充默认值
        Ok(AppConfigImpl::new(raw))
    }

    /// 从指定 toml 文件加载，不读取环境变量
    pub fn from_file(path: &str) -> Result<AppConfigImpl, Box<dyn Error>> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let raw: RawConfig = config.try_deserialize()?;
        Ok(AppConfigImpl::new(raw))
    }

    pub fn assistants(&self) -> Vec<AccountId> {
        read(&self.assistants).clone()
    }

    pub fn server(&self) -> ServerConfig {
        read(&self.server).clone()
    }

    pub fn bridge(&self) -> BridgeConfig {
        read(&self.bridge).clone()
    }

    pub fn playback(&self) -> PlaybackSettings {
        read(&self.playback).clone()
    }

    pub fn images(&self) -> ImageConfig {
        read(&self.images).clone()
    }

    pub fn media(&self) -> MediaConfig {
        read(&self.media).clone()
    }
}

impl Default for AppConfigImpl {
    fn default() -> Self {
        AppConfigImpl::new(RawConfig::default())
    }
}

impl PlaybackConfig for AppConfigImpl {
    fn auto_end_enabled(&self) -> bool {
        read(&self.playback).auto_end
    }

    fn auto_end_after_secs(&self) -> u64 {
        read(&self.playback).auto_end_after_secs
    }

    fn change_stream_attempts(&self) -> u32 {
        read(&self.playback).change_stream_attempts
    }

    fn change_stream_backoff_ms(&self) -> u64 {
        read(&self.playback).change_stream_backoff_ms
    }

    fn bot_username(&self) -> String {
        read(&self.playback).bot_username.clone()
    }

    fn support_chat(&self) -> String {
        read(&self.playback).support_chat.clone()
    }

    fn stream_image(&self) -> String {
        read(&self.images).stream.clone()
    }

    fn telegram_audio_image(&self) -> String {
        read(&self.images).telegram_audio.clone()
    }

    fn telegram_video_image(&self) -> String {
        read(&self.images).telegram_video.clone()
    }

    fn soundcloud_image(&self) -> String {
        read(&self.images).soundcloud.clone()
    }

    fn youtube_image(&self) -> String {
        read(&self.images).youtube.clone()
    }
}
