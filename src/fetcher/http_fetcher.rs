use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;

use crate::app::{GatorError, Result};
use crate::fetcher::{Fetcher, USER_AGENT};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GatorError::HttpClient)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Vec<u8>> {
        let started = Instant::now();

        let request = async {
            let response = self.client.get(url).send().await.map_err(|source| GatorError::Http {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(GatorError::HttpStatus {
                    url: url.to_string(),
                    status,
                });
            }

            let body = response.bytes().await.map_err(|source| GatorError::Http {
                url: url.to_string(),
                source,
            })?;

            Ok::<_, GatorError>(body.to_vec())
        };

        match tokio::time::timeout_at(deadline, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(url, "Feed request hit its deadline");
                Err(GatorError::Timeout {
                    url: url.to_string(),
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}
