pub mod retry;
pub mod single_flight;
pub mod worker_pool;

pub use retry::{retry, Backoff, RetryPolicy};
pub use single_flight::SingleFlight;
pub use worker_pool::{WorkerPool, WorkerPoolError};
