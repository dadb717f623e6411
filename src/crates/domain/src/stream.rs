use crate::time_format::seconds_to_hms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Audio,
    Video,
}

impl StreamType {
    pub fn is_video(&self) -> bool {
        matches!(self, StreamType::Video)
    }

    pub fn from_video_flag(video: bool) -> Self {
        if video {
            StreamType::Video
        } else {
            StreamType::Audio
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Audio => "audio",
            StreamType::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQuality {
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Sd480p,
}

/// 裁剪区间（秒），对应 ffmpeg 的 `-ss` / `-to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub start_seconds: u64,
    pub end_seconds: u64,
}

/// 交给语音通话驱动的流描述
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub locator: String,
    pub audio_quality: AudioQuality,
    /// None 表示忽略视频轨
    pub video_quality: Option<VideoQuality>,
    pub clip: Option<Clip>,
}

impl StreamDescriptor {
    pub fn new(locator: impl Into<String>, stream_type: StreamType) -> Self {
        Self {
            locator: locator.into(),
            audio_quality: AudioQuality::High,
            video_quality: stream_type.is_video().then_some(VideoQuality::Sd480p),
            clip: None,
        }
    }

    pub fn clipped(mut self, start_seconds: u64, end_seconds: u64) -> Self {
        self.clip = Some(Clip {
            start_seconds,
            end_seconds,
        });
        self
    }

    pub fn stream_type(&self) -> StreamType {
        StreamType::from_video_flag(self.video_quality.is_some())
    }

    pub fn ffmpeg_parameters(&self) -> Option<String> {
        self.clip.map(|clip| {
            format!(
                "-ss {} -to {}",
                seconds_to_hms(clip.start_seconds),
                seconds_to_hms(clip.end_seconds)
            )
        })
    }
}
