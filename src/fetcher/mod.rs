pub mod http_fetcher;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::app::Result;

/// Product token sent as `User-Agent` on every feed request.
pub const USER_AGENT: &str = concat!("gator/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Fetcher {
    /// Fetch the raw body at `url`, giving up once `deadline` passes.
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Vec<u8>>;
}
