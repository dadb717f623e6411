pub mod ffmpeg_speed;
pub mod probe;

pub use ffmpeg_speed::FfmpegSpeedTranscoder;
