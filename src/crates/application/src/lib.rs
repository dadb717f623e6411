pub mod config;
pub mod error;
pub mod event;
pub mod playback;
pub mod shared;
