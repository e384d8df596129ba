use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AppError, Result};

/// Source of the raw scoreboard report.
#[async_trait]
pub trait ScoreboardSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Fetches the terminal rendering of the scoreboard over plain HTTP GET.
pub struct HttpScoreboard {
    url: String,
    client: reqwest::Client,
}

impl HttpScoreboard {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl ScoreboardSource for HttpScoreboard {
    async fn fetch(&self) -> Result<String> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("GET {} returned {status}", self.url)));
        }
        let body = resp.text().await?;
        debug!(bytes = body.len(), "scoreboard fetched");
        Ok(body)
    }
}
