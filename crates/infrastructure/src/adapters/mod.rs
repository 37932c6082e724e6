//! Adapters for the HTTP and clock ports.

mod reqwest_client;
mod system_clock;

pub use reqwest_client::{ApiResponse, HttpClientError, ReqwestApiClient};
pub(crate) use reqwest_client::with_trailing_slash;
pub use system_clock::SystemClock;
