pub mod notifier;
pub mod queue;
pub mod resolver;
pub mod speed;
pub mod stream;
pub mod time_format;
pub mod transcoding;
pub mod value;
pub mod voice_call;
