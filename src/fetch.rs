use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::registry::Dataset;

/// Where the current registry rows come from.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_remote_dataset(&self) -> AppResult<Dataset>;
}

/// HTTP client for the spreadsheet CSV export.
#[derive(Clone)]
pub struct SheetClient {
    http: Client,
    url: String,
}

impl SheetClient {
    pub fn new(url: impl Into<String>, timeout_secs: Option<u64>) -> AppResult<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder.build()?,
            url: url.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(config.sheet_url.clone(), config.http_timeout_secs)
    }
}

#[async_trait]
impl RegistrySource for SheetClient {
    async fn fetch_remote_dataset(&self) -> AppResult<Dataset> {
        let bytes = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let dataset = Dataset::from_sheet_bytes(&bytes)?;
        info!(rows = dataset.len(), bytes = bytes.len(), "fetched registry sheet");
        Ok(dataset)
    }
}
