use crate::transcoding::probe;
use application::shared::{SingleFlight, WorkerPool};
use async_trait::async_trait;
use domain::speed::PlaybackSpeed;
use domain::transcoding::{SpeedTranscoder, TranscodeError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// 用 ffmpeg 生成倍速副本，ffprobe 探测时长。
///
/// 副本按倍速分目录存放在 `playback_dir/<speed>/<源文件名>`，已存在时直接复用。
/// 同一输出路径的并发请求只跑一次 ffmpeg。
pub struct FfmpegSpeedTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    playback_dir: PathBuf,
    pool: WorkerPool,
    encodes: SingleFlight<PathBuf, Result<(), TranscodeError>>,
}

impl FfmpegSpeedTranscoder {
    pub fn new(
        ffmpeg_path: String,
        ffprobe_path: String,
        playback_dir: impl Into<PathBuf>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            playback_dir: playback_dir.into(),
            pool,
            encodes: SingleFlight::new(),
        }
    }

    pub fn speed_copy_path(&self, source: &str, speed: PlaybackSpeed) -> Option<PathBuf> {
        let file_name = Path::new(source).file_name()?;
        Some(self.playback_dir.join(speed.as_str()).join(file_name))
    }

    fn build_speed_arguments(source: &str, speed: PlaybackSpeed, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            source.to_string(),
            "-filter:v".to_string(),
            format!("setpts={}*PTS", speed.setpts_factor()),
            "-filter:a".to_string(),
            format!("atempo={}", speed.as_str()),
            output.to_string_lossy().to_string(),
        ]
    }

    async fn encode(
        ffmpeg_path: String,
        pool: WorkerPool,
        source: String,
        speed: PlaybackSpeed,
        output: PathBuf,
    ) -> Result<(), TranscodeError> {
        // 排队等到执行时，上一轮可能已经生成好
        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Ok(());
        }
        let dir = output
            .parent()
            .ok_or_else(|| TranscodeError::Failed(format!("invalid output path {:?}", output)))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| TranscodeError::Failed(format!("create {:?}: {}", dir, e)))?;

        // 先写临时文件再改名，中途失败不会留下半成品被当作缓存复用
        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let partial = dir.join(format!("partial-{}", file_name));
        let args = Self::build_speed_arguments(&source, speed, &partial);

        log::info!("[FFmpeg] Speed copy: input={}, speed={}", source, speed);
        log::debug!("[FFmpeg] Command: {} {}", ffmpeg_path, args.join(" "));
        let start_time = std::time::Instant::now();

        let output_result = pool
            .run(
                Command::new(&ffmpeg_path)
                    .args(&args)
                    .stdout(Stdio::null())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .output(),
            )
            .await
            .map_err(|e| TranscodeError::Failed(e.to_string()))?
            .map_err(|e| {
                log::error!("[FFmpeg] Failed to execute: {}", e);
                TranscodeError::Failed(format!("Failed to execute FFmpeg: {}", e))
            })?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            log::error!(
                "[FFmpeg] Speed copy failed: input={}, exit_code={:?}, stderr={}",
                source,
                output_result.status.code(),
                stderr
            );
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(TranscodeError::Failed(format!("FFmpeg failed: {}", stderr)));
        }

        tokio::fs::rename(&partial, &output)
            .await
            .map_err(|e| TranscodeError::Failed(format!("rename {:?}: {}", partial, e)))?;
        log::info!(
            "[FFmpeg] Speed copy ready: output={:?}, elapsed={:?}",
            output,
            start_time.elapsed()
        );
        Ok(())
    }
}

#[async_trait]
impl SpeedTranscoder for FfmpegSpeedTranscoder {
    async fn speed_copy(&self, source: &str, speed: PlaybackSpeed) -> Result<String, TranscodeError> {
        if speed.is_normal() {
            return Ok(source.to_string());
        }
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(TranscodeError::SourceMissing(source.to_string()));
        }
        let output = self
            .speed_copy_path(source, speed)
            .ok_or_else(|| TranscodeError::SourceMissing(source.to_string()))?;
        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            log::debug!("[FFmpeg] Reusing speed copy {:?}", output);
        } else {
            let job = Self::encode(
                self.ffmpeg_path.clone(),
                self.pool.clone(),
                source.to_string(),
                speed,
                output.clone(),
            );
            self.encodes.run(output.clone(), job).await?;
        }
        Ok(output.to_string_lossy().to_string())
    }

    async fn probe_duration(&self, path: &str) -> Result<u64, TranscodeError> {
        self.pool
            .run(probe::probe_duration(&self.ffprobe_path, path))
            .await
            .map_err(|e| TranscodeError::Probe(e.to_string()))?
    }
}
