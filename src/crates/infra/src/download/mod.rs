pub mod http;

pub use http::{FetchError, HttpFetcher};
