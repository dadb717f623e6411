pub mod bridge;
pub use bridge::BridgeClient;

pub mod config;
pub use config::{AppConfigImpl, BridgeConfig, MediaConfig, ServerConfig};

pub mod download;
pub use download::HttpFetcher;

pub mod event_bus;
pub use event_bus::InMemoryEventBus;

pub mod resolver;
pub use resolver::YtDlpResolver;

pub mod transcoding;
pub use transcoding::FfmpegSpeedTranscoder;

#[cfg(test)]
pub(crate) mod test_support;
