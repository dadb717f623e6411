pub mod assistant_pool;
pub mod auto_end;
pub mod controller;
pub mod now_playing;
pub mod play;
pub mod queue_store;
pub mod stream_control;

pub use assistant_pool::AssistantPool;
pub use auto_end::AutoEndStatus;
pub use controller::{PlayOutcome, PlaybackController, TransitionOutcome, MAX_LOOP};
pub use play::PlayRequest;
pub use queue_store::QueueStore;

#[cfg(test)]
pub(crate) mod fakes;
