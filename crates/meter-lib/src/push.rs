//! HTTP client pushing startup records to the exporter

use crate::models::StartupRecord;
use anyhow::{Context, Result};
use reqwest::Client;
use url::Url;

/// Client for the exporter's record ingestion endpoint
pub struct PushClient {
    client: Client,
    endpoint: Url,
}

impl PushClient {
    /// Create a new push client
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(endpoint).context("Invalid exporter URL")?;

        Ok(Self { client, endpoint })
    }

    /// Push every record, one POST each. Stops at the first failure; the
    /// next sweep re-collects everything, so nothing is lost by bailing.
    pub async fn push(&self, records: &[StartupRecord]) -> Result<()> {
        for record in records {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(record)
                .send()
                .await
                .context("failed to post the startup record")?;

            if !response.status().is_success() {
                anyhow::bail!("received status {} from exporter", response.status());
            }
        }
        Ok(())
    }
}
