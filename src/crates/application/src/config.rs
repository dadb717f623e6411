/// 播放控制器所需的配置
pub trait PlaybackConfig: Send + Sync {
    /// 是否在语音聊天无人时自动退出
    fn auto_end_enabled(&self) -> bool;

    /// 仅剩助手时，多少秒后退出
    fn auto_end_after_secs(&self) -> u64;

    fn change_stream_attempts(&self) -> u32;

    fn change_stream_backoff_ms(&self) -> u64;

    fn bot_username(&self) -> String;

    /// 支持群链接
    fn support_chat(&self) -> String;

    fn stream_image(&self) -> String;
    fn telegram_audio_image(&self) -> String;
    fn telegram_video_image(&self) -> String;
    fn soundcloud_image(&self) -> String;
    /// 缩略图获取失败时的兜底封面
    fn youtube_image(&self) -> String;
}
