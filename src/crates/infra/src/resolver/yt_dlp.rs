use crate::download::HttpFetcher;
use crate::transcoding::probe;
use application::shared::{SingleFlight, WorkerPool};
use async_trait::async_trait;
use domain::queue::{ExternalId, SourceKind};
use domain::resolver::{MediaResolver, ResolveError, ResolvedTrack, TrackMetadata};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const AUDIO_FORMAT: &str = "bestaudio/best";
const VIDEO_FORMAT: &str = "best[height<=?720][width<=?1280]";
const AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "m4a", "webm"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mkv"];
/// 直接用 HTTP 下载的媒体后缀
const DIRECT_MEDIA_EXTENSIONS: [&str; 8] =
    ["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav", "mp4"];

/// 从视频链接里取出 id：`watch?v=<id>&...` 或最后一段路径
pub fn extract_video_id(link: &str) -> String {
    if let Some((_, rest)) = link.split_once("v=") {
        return rest.split('&').next().unwrap_or(rest).to_string();
    }
    let path = link.split('?').next().unwrap_or(link);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    extractor_key: Option<String>,
    is_live: Option<bool>,
    /// 搜索结果是一个播放列表
    entries: Option<Vec<VideoInfo>>,
}

impl VideoInfo {
    fn parse(json: &str) -> Result<VideoInfo, ResolveError> {
        let info: VideoInfo = serde_json::from_str(json)
            .map_err(|e| ResolveError::Unavailable(format!("unexpected yt-dlp output: {}", e)))?;
        match info.entries {
            Some(entries) => entries
                .into_iter()
                .next()
                .ok_or_else(|| ResolveError::NotFound("no search result".to_string())),
            None => Ok(info),
        }
    }

    fn into_metadata(self, fallback_link: &str) -> Result<(TrackMetadata, bool), ResolveError> {
        let id = self
            .id
            .ok_or_else(|| ResolveError::NotFound(fallback_link.to_string()))?;
        let is_youtube = self
            .extractor_key
            .as_deref()
            .map(|k| k.eq_ignore_ascii_case("youtube"))
            .unwrap_or(true);
        let external_id = match self.extractor_key.as_deref() {
            _ if is_youtube => ExternalId::Video(id.clone()),
            Some(k) if k.eq_ignore_ascii_case("soundcloud") => ExternalId::SoundCloud,
            _ => ExternalId::None,
        };
        let link = self.webpage_url.unwrap_or_else(|| {
            if is_youtube {
                format!("{}{}", WATCH_URL, id)
            } else {
                fallback_link.to_string()
            }
        });
        let is_live = self.is_live.unwrap_or(false);
        let metadata = TrackMetadata {
            title: self.title.unwrap_or_else(|| id.clone()),
            duration_seconds: if is_live {
                0
            } else {
                self.duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0).round() as u64
            },
            thumbnail: self
                .thumbnail
                .map(|t| t.split('?').next().unwrap_or(&t).to_string()),
            external_id,
            link,
            is_live,
        };
        Ok((metadata, is_youtube))
    }
}

struct YtDlp {
    yt_dlp_path: String,
    ffprobe_path: String,
    download_dir: PathBuf,
    cookies_file: Option<String>,
    pool: WorkerPool,
}

impl YtDlp {
    fn common_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string(), "--no-playlist".to_string()];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.clone());
        }
        args
    }

    fn info_args(&self, target: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push("--dump-single-json".to_string());
        args.push(target.to_string());
        args
    }

    fn live_args(&self, link: &str, want_video: bool) -> Vec<String> {
        let mut args = self.common_args();
        args.push("-g".to_string());
        args.push("-f".to_string());
        args.push(format_for(want_video).to_string());
        args.push(link.to_string());
        args
    }

    fn download_args(&self, link: &str, want_video: bool) -> Vec<String> {
        let template = self.download_dir.join("%(id)s.%(ext)s");
        let mut args = self.common_args();
        args.extend([
            "-f".to_string(),
            format_for(want_video).to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            link.to_string(),
        ]);
        args
    }

    fn thumbnail_args(&self, link: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "--skip-download".to_string(),
            "--print".to_string(),
            "thumbnail".to_string(),
            link.to_string(),
        ]);
        args
    }

    /// 已下载的文件：`download_dir/<id>.<ext>`
    fn cached_file(&self, video_id: &str, want_video: bool) -> Option<PathBuf> {
        let extensions: &[&str] = if want_video {
            &VIDEO_EXTENSIONS
        } else {
            &AUDIO_EXTENSIONS
        };
        extensions
            .iter()
            .map(|ext| self.download_dir.join(format!("{}.{}", video_id, ext)))
            .find(|path| path.is_file())
    }

    /// 在重任务池内执行 yt-dlp，返回 stdout
    async fn run(&self, args: Vec<String>) -> Result<String, ResolveError> {
        log::debug!("[yt-dlp] Command: {} {}", self.yt_dlp_path, args.join(" "));
        let output = self
            .pool
            .run(
                Command::new(&self.yt_dlp_path)
                    .args(&args)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .output(),
            )
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?
            .map_err(|e| {
                log::error!("[yt-dlp] Failed to execute: {}", e);
                ResolveError::Unavailable(format!("Failed to execute yt-dlp: {}", e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            log::warn!(
                "[yt-dlp] exit_code={:?}, stderr={}",
                output.status.code(),
                stderr
            );
            return Err(classify_failure(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn info(&self, target: &str) -> Result<VideoInfo, ResolveError> {
        let stdout = self.run(self.info_args(target)).await?;
        VideoInfo::parse(&stdout)
    }

    async fn download(&self, video_id: &str, link: &str, want_video: bool) -> Result<String, ResolveError> {
        if let Some(path) = self.cached_file(video_id, want_video) {
            log::info!("[yt-dlp] Using cached {:?}", path);
            return Ok(path.to_string_lossy().to_string());
        }
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| ResolveError::Download(format!("create {:?}: {}", self.download_dir, e)))?;

        log::info!("[yt-dlp] Downloading {} (video={})", link, want_video);
        let stdout = self
            .run(self.download_args(link, want_video))
            .await
            .map_err(|e| match e {
                ResolveError::Unavailable(msg) => ResolveError::Download(msg),
                other => other,
            })?;
        let printed = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
            .filter(|path| path.is_file());
        printed
            .or_else(|| self.cached_file(video_id, want_video))
            .map(|path| path.to_string_lossy().to_string())
            .ok_or_else(|| ResolveError::Download(format!("no file produced for {}", link)))
    }

    async fn probe(&self, path: &Path) -> u64 {
        let path = path.to_string_lossy();
        match self.pool.run(probe::probe_duration(&self.ffprobe_path, &path)).await {
            Ok(Ok(seconds)) => seconds,
            Ok(Err(e)) => {
                log::warn!("[Resolve] duration of {} unknown: {}", path, e);
                0
            }
            Err(e) => {
                log::warn!("[Resolve] duration of {} unknown: {}", path, e);
                0
            }
        }
    }
}

fn format_for(want_video: bool) -> &'static str {
    if want_video {
        VIDEO_FORMAT
    } else {
        AUDIO_FORMAT
    }
}

fn classify_failure(stderr: String) -> ResolveError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("not available")
        || lower.contains("unsupported url")
    {
        ResolveError::NotFound(stderr)
    } else {
        ResolveError::Unavailable(stderr)
    }
}

/// 基于 yt-dlp 的解析与下载。
///
/// 同一链接同一类型的并发下载合并为一次（key 为 `a:<link>` / `v:<link>`），
/// 所有子进程都在重任务池内执行。
pub struct YtDlpResolver {
    inner: Arc<YtDlp>,
    fetcher: HttpFetcher,
    downloads: Arc<SingleFlight<String, Result<String, ResolveError>>>,
}

impl YtDlpResolver {
    pub fn new(
        yt_dlp_path: String,
        ffprobe_path: String,
        download_dir: impl Into<PathBuf>,
        cookies_file: Option<String>,
        pool: WorkerPool,
        fetcher: HttpFetcher,
    ) -> Self {
        Self {
            inner: Arc::new(YtDlp {
                yt_dlp_path,
                ffprobe_path,
                download_dir: download_dir.into(),
                cookies_file,
                pool,
            }),
            fetcher,
            downloads: Arc::new(SingleFlight::new()),
        }
    }

    fn flight_key(link: &str, want_video: bool) -> String {
        format!("{}:{}", if want_video { "v" } else { "a" }, link)
    }

    async fn download_link(
        &self,
        video_id: &str,
        link: &str,
        want_video: bool,
    ) -> Result<String, ResolveError> {
        let inner = self.inner.clone();
        let id = video_id.to_string();
        let owned_link = link.to_string();
        self.downloads
            .run(Self::flight_key(link, want_video), async move {
                inner.download(&id, &owned_link, want_video).await
            })
            .await
    }

    /// 直链媒体用 HTTP 下载，文件名取链接最后一段
    async fn fetch_direct(&self, url: &str) -> Result<ResolvedTrack, ResolveError> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or("media").to_string();
        let dest = self.inner.download_dir.join(&file_name);
        let fetcher = self.fetcher.clone();
        let owned_url = url.to_string();
        let target = dest.clone();
        let local = self
            .downloads
            .run(Self::flight_key(url, false), async move {
                if target.is_file() {
                    return Ok(target.to_string_lossy().to_string());
                }
                fetcher
                    .fetch_to_file(&owned_url, &target)
                    .await
                    .map(|_| target.to_string_lossy().to_string())
                    .map_err(|e| ResolveError::Download(e.to_string()))
            })
            .await?;
        let duration = self.inner.probe(&dest).await;
        Ok(ResolvedTrack {
            metadata: TrackMetadata {
                title: file_name,
                duration_seconds: duration,
                thumbnail: None,
                external_id: ExternalId::None,
                link: url.to_string(),
                is_live: false,
            },
            source_kind: SourceKind::Generic,
            locator: local,
        })
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, want_video: bool) -> Result<ResolvedTrack, ResolveError> {
        let query = query.trim();
        if is_url(query) {
            match url_extension(query).as_deref() {
                Some("m3u8") => {
                    return Ok(ResolvedTrack {
                        metadata: TrackMetadata {
                            title: "Live stream".to_string(),
                            duration_seconds: 0,
                            thumbnail: None,
                            external_id: ExternalId::None,
                            link: query.to_string(),
                            is_live: true,
                        },
                        source_kind: SourceKind::IndexedStream,
                        locator: query.to_string(),
                    })
                }
                Some(ext) if DIRECT_MEDIA_EXTENSIONS.contains(&ext) => {
                    return self.fetch_direct(query).await
                }
                _ => {}
            }
        }

        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };
        let info = self.inner.info(&target).await?;
        let (metadata, is_youtube) = info.into_metadata(query)?;
        if metadata.is_live {
            let locator = metadata.link.clone();
            return Ok(ResolvedTrack {
                metadata,
                source_kind: SourceKind::LiveUrl,
                locator,
            });
        }
        if is_youtube {
            // 换曲时再下载
            let locator = metadata.link.clone();
            return Ok(ResolvedTrack {
                metadata,
                source_kind: SourceKind::DownloadedFile,
                locator,
            });
        }
        // 其他站点没有可复用的 id，立即下载
        let id = extract_video_id(&metadata.link);
        let locator = self.download_link(&id, &metadata.link, want_video).await?;
        Ok(ResolvedTrack {
            metadata,
            source_kind: SourceKind::Generic,
            locator,
        })
    }

    async fn live_url(&self, video_id: &str, want_video: bool) -> Result<String, ResolveError> {
        let link = format!("{}{}", WATCH_URL, video_id);
        let stdout = self.inner.run(self.inner.live_args(&link, want_video)).await?;
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::Unavailable(format!("no stream url for {}", link)))
    }

    async fn download(&self, video_id: &str, want_video: bool) -> Result<String, ResolveError> {
        let link = format!("{}{}", WATCH_URL, video_id);
        self.download_link(video_id, &link, want_video).await
    }

    async fn thumbnail(&self, video_id: &str) -> Result<String, ResolveError> {
        let link = format!("{}{}", WATCH_URL, video_id);
        let stdout = self.inner.run(self.inner.thumbnail_args(&link)).await?;
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != "NA")
            .map(|line| line.split('?').next().unwrap_or(line).to_string())
            .ok_or_else(|| ResolveError::NotFound(format!("no thumbnail for {}", video_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver(dir: &Path, cookies: Option<&str>) -> YtDlpResolver {
        YtDlpResolver::new(
            "/nonexistent/yt-dlp".to_string(),
            "/nonexistent/ffprobe".to_string(),
            dir,
            cookies.map(str::to_string),
            WorkerPool::new(2),
            HttpFetcher::new(Duration::from_secs(1), 1, Duration::from_millis(1)).unwrap(),
        )
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc"), "dQw4w9WgXcQ");
        assert_eq!(
            extract_video_id("https://soundcloud.com/artist/some-track/"),
            "some-track"
        );
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://cdn.example/a/b.MP3?x=1").as_deref(), Some("mp3"));
        assert_eq!(url_extension("https://tv.example/live/index.m3u8").as_deref(), Some("m3u8"));
        assert_eq!(url_extension("https://www.youtube.com/watch?v=abc"), None);
    }

    #[test]
    fn test_parse_search_result_takes_first_entry() {
        let json = r#"{
            "_type": "playlist",
            "entries": [
                {"id": "abc123", "title": "First", "duration": 212.4,
                 "thumbnail": "https://i.ytimg.com/vi/abc123/hq.jpg?sqp=1",
                 "webpage_url": "https://www.youtube.com/watch?v=abc123",
                 "extractor_key": "Youtube", "is_live": false},
                {"id": "zzz", "title": "Second"}
            ]
        }"#;
        let info = VideoInfo::parse(json).unwrap();
        let (metadata, is_youtube) = info.into_metadata("first song").unwrap();
        assert!(is_youtube);
        assert_eq!(metadata.title, "First");
        assert_eq!(metadata.duration_seconds, 212);
        assert_eq!(metadata.external_id, ExternalId::Video("abc123".to_string()));
        assert_eq!(
            metadata.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/hq.jpg")
        );
        assert!(!metadata.is_live);
    }

    #[test]
    fn test_parse_empty_search_is_not_found() {
        let err = VideoInfo::parse(r#"{"_type": "playlist", "entries": []}"#).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        let err = VideoInfo::parse("not json").unwrap_err();
        assert!(matches!(err, ResolveError::Unavailable(_)));
    }

    #[test]
    fn test_live_and_soundcloud_metadata() {
        let live = VideoInfo::parse(
            r#"{"id": "live1", "title": "News", "is_live": true, "duration": null,
                "extractor_key": "Youtube"}"#,
        )
        .unwrap();
        let (metadata, _) = live.into_metadata("news").unwrap();
        assert!(metadata.is_live);
        assert_eq!(metadata.duration_seconds, 0);
        assert_eq!(metadata.link, "https://www.youtube.com/watch?v=live1");

        let sc = VideoInfo::parse(
            r#"{"id": "998", "title": "Mix", "duration": 3600.0,
                "webpage_url": "https://soundcloud.com/dj/mix",
                "extractor_key": "Soundcloud"}"#,
        )
        .unwrap();
        let (metadata, is_youtube) = sc.into_metadata("https://soundcloud.com/dj/mix").unwrap();
        assert!(!is_youtube);
        assert_eq!(metadata.external_id, ExternalId::SoundCloud);
    }

    #[test]
    fn test_command_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), Some("/cookies/cookies.txt"));
        let args = r.inner.download_args("https://www.youtube.com/watch?v=abc", false);
        let joined = args.join(" ");
        assert!(joined.contains("--cookies /cookies/cookies.txt"));
        assert!(joined.contains("-f bestaudio/best"));
        assert!(joined.contains("%(id)s.%(ext)s"));

        let args = r.inner.live_args("https://www.youtube.com/watch?v=abc", true);
        assert!(args.join(" ").contains("-g -f best[height<=?720][width<=?1280]"));

        let r = resolver(dir.path(), None);
        assert!(!r.inner.info_args("ytsearch1:song").contains(&"--cookies".to_string()));
    }

    #[tokio::test]
    async fn test_cached_download_skips_yt_dlp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.m4a"), b"audio").unwrap();
        let r = resolver(dir.path(), None);

        let (first, second) = tokio::join!(r.download("abc", false), r.download("abc", false));
        let expected = dir.path().join("abc.m4a").to_string_lossy().to_string();
        assert_eq!(first.unwrap(), expected);
        assert_eq!(second.unwrap(), expected);
        assert_eq!(r.downloads.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_without_yt_dlp_fails() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), None);
        let err = r.download("abc", true).await.unwrap_err();
        assert!(matches!(err, ResolveError::Download(_)));
    }

    #[tokio::test]
    async fn test_index_stream_links_are_not_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), None);
        let track = r
            .resolve("https://tv.example/live/index.m3u8", true)
            .await
            .unwrap();
        assert_eq!(track.source_kind, SourceKind::IndexedStream);
        assert_eq!(track.locator, "https://tv.example/live/index.m3u8");
        assert_eq!(track.metadata.duration_seconds, 0);
    }

    #[tokio::test]
    async fn test_already_fetched_direct_link_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"audio").unwrap();
        let r = resolver(dir.path(), None);
        let track = r
            .resolve("https://cdn.example/files/song.mp3?token=1", false)
            .await
            .unwrap();
        assert_eq!(track.source_kind, SourceKind::Generic);
        assert_eq!(
            track.locator,
            dir.path().join("song.mp3").to_string_lossy().to_string()
        );
        assert_eq!(track.metadata.title, "song.mp3");
        // 没有 ffprobe 时时长未知
        assert_eq!(track.metadata.duration_seconds, 0);
    }
}
