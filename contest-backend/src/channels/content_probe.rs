//! Link content-type lookups over HTTP

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;

use crate::contest::traits::ContentTypeProbe;
use crate::error::{ContestError, ContestResult};

pub struct HttpContentProbe {
    client: reqwest::Client,
}

impl HttpContentProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("ContestBot/1.0 (Link Check)")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

fn declared_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl ContentTypeProbe for HttpContentProbe {
    /// `HEAD` first; hosts that refuse it get a `GET` whose body is never read
    async fn content_type(&self, url: &str) -> ContestResult<Option<String>> {
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                return Ok(declared_type(&response));
            }
            Ok(response) => {
                log::debug!(
                    "[probe] HEAD {} returned {}, retrying with GET",
                    url,
                    response.status()
                );
            }
            Err(e) => {
                log::debug!("[probe] HEAD {} failed: {}, retrying with GET", url, e);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ContestError::transient)?;
        Ok(declared_type(&response))
    }
}
