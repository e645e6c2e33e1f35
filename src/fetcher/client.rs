use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{ActivityError, Result};
use crate::store::EXTENSION;
use crate::timestamp::TimestampKey;

pub const DEFAULT_BASE_URL: &str = "https://data.gharchive.org/";

pub struct ArchiveClient {
    client: Client,
    base_url: Url,
}

impl ArchiveClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ghactivity/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ActivityError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| ActivityError::ConfigError(format!("Invalid base URL: {e}")))?;

        // Url::join drops the last path segment unless it ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn archive_url(&self, timestamp: TimestampKey) -> Result<Url> {
        Ok(self.base_url.join(&format!("{timestamp}.{EXTENSION}"))?)
    }

    /// Downloads the compressed archive for one hour.
    pub async fn fetch_archive(&self, timestamp: TimestampKey) -> Result<Vec<u8>> {
        let url = self.archive_url(timestamp)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ActivityError::ArchiveMissing(timestamp));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActivityError::ApiError(format!(
                "Failed to fetch archive {timestamp}: {status} - {body}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
