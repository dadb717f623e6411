use crate::config::PlaybackConfig;
use domain::notifier::{NowPlayingCard, NowPlayingLink};
use domain::queue::{ExternalId, QueueEntry, SourceKind};
use domain::value::ChatId;

const TITLE_MAX_CHARS: usize = 23;

pub fn truncate_title(title: &str) -> String {
    title.chars().take(TITLE_MAX_CHARS).collect()
}

/// 根据条目来源选择卡片的链接与封面。`thumbnail` 仅对视频站条目有意义。
pub fn build_card(
    config: &dyn PlaybackConfig,
    chat_id: ChatId,
    entry: &QueueEntry,
    thumbnail: Option<String>,
) -> NowPlayingCard {
    let (link, artwork) = match (&entry.source_kind, &entry.external_id) {
        (SourceKind::IndexedStream, _) => (NowPlayingLink::None, config.stream_image()),
        (_, ExternalId::Video(id)) => (
            NowPlayingLink::DeepLink(format!(
                "https://t.me/{}?start=info_{}",
                config.bot_username(),
                id
            )),
            thumbnail.unwrap_or_else(|| config.youtube_image()),
        ),
        (_, ExternalId::Telegram) => {
            let artwork = if entry.stream_type.is_video() {
                config.telegram_video_image()
            } else {
                config.telegram_audio_image()
            };
            (NowPlayingLink::SupportChat(config.support_chat()), artwork)
        }
        (_, ExternalId::SoundCloud) => (
            NowPlayingLink::SupportChat(config.support_chat()),
            config.soundcloud_image(),
        ),
        (_, ExternalId::None) => (NowPlayingLink::None, config.stream_image()),
    };
    NowPlayingCard {
        chat_id,
        title: truncate_title(&entry.title),
        duration_display: entry.duration_display.clone(),
        requested_by: entry.requested_by.clone(),
        link,
        artwork,
        stream_type: entry.stream_type,
    }
}
