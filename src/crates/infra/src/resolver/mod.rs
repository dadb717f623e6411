pub mod yt_dlp;

pub use yt_dlp::{extract_video_id, YtDlpResolver};
