use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use core_types::{retry::RetryPolicy, window::FetchWindow};
use log::warn;
use reqwest::Client;
use thiserror::Error;

/// Date format the symbol-history endpoint expects in its query string.
const QUERY_DATE_FMT: &str = "%m/%d/%Y";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
}

/// Transport seam: one attempt at retrieving the raw history page for one
/// instrument and window. Retry lives a layer up, in [`PageFetcher`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, instrument: &str, window: FetchWindow)
        -> Result<String, FetchError>;
}

/// Production transport against the exchange's symbol-history pages.
pub struct HttpPageSource {
    client: Client,
    base_url: String,
}

impl HttpPageSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("harvest-engine/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn with_default_timeout(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::new(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(
        &self,
        instrument: &str,
        window: FetchWindow,
    ) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, instrument);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("FromDate", window.start.format(QUERY_DATE_FMT).to_string()),
                ("ToDate", window.end.format(QUERY_DATE_FMT).to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Retrieves one window's content with a bounded retry budget. Either the
/// full page body comes back or the terminal error from the last attempt.
pub struct PageFetcher {
    source: Arc<dyn PageSource>,
    policy: RetryPolicy,
}

impl PageFetcher {
    pub fn new(source: Arc<dyn PageSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub async fn fetch(&self, instrument: &str, window: FetchWindow) -> Result<String, FetchError> {
        self.policy
            .run(|attempt| async move {
                match self.source.fetch_page(instrument, window).await {
                    Ok(body) => Ok(body),
                    Err(err) => {
                        warn!(
                            "fetch attempt {} for {} [{} - {}] failed: {}",
                            attempt + 1,
                            instrument,
                            window.start,
                            window.end,
                            err
                        );
                        Err(err)
                    }
                }
            })
            .await
    }
}
