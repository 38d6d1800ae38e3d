//! HTTP side of the digest: one GET of the calendar page with a browser User-Agent.

use crate::config::DigestConfig;
use crate::releases::parse::extract_releases;
use crate::releases::{DigestSource, ReleaseDigest, ReleaseEntry, MAX_ENTRIES};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("bad calendar url: {0}")]
    Url(#[from] url::ParseError),
    #[error("calendar request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("calendar returned {0}")]
    Status(reqwest::StatusCode),
}

/// Fetches and renders release digests. Cheap to clone.
#[derive(Clone)]
pub struct DigestClient {
    url_template: String,
    user_agent: String,
    command: String,
    client: reqwest::Client,
}

impl DigestClient {
    /// `command` is the digest command shown in the footer.
    pub fn new(config: &DigestConfig, command: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url_template: config.url_template.clone(),
            user_agent: config.user_agent.clone(),
            command: command.to_string(),
            client,
        })
    }

    /// Calendar URL for a region.
    pub fn region_url(&self, region: &str) -> String {
        self.url_template.replace("{region}", region)
    }

    /// Fetch the calendar for `region`. Failures are logged and yield a failure digest.
    pub async fn fetch(&self, region: &str) -> ReleaseDigest {
        match self.try_fetch(region).await {
            Ok(entries) => {
                log::debug!("releases: {} entries for {}", entries.len(), region);
                ReleaseDigest {
                    region: region.to_string(),
                    entries,
                    failed: false,
                    command: self.command.clone(),
                }
            }
            Err(e) => {
                log::warn!("releases: fetch for {} failed: {}", region, e);
                ReleaseDigest::failure(region, &self.command)
            }
        }
    }

    async fn try_fetch(&self, region: &str) -> Result<Vec<ReleaseEntry>, FetchError> {
        let url = Url::parse(&self.region_url(region))?;
        let res = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        if res.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status(res.status()));
        }
        let body = res.text().await?;
        Ok(extract_releases(&body, &url, MAX_ENTRIES))
    }
}

#[async_trait]
impl DigestSource for DigestClient {
    async fn digest(&self, region: &str) -> String {
        self.fetch(region).await.to_string()
    }
}
