use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::registry::Coordinates;

/// Forward geocoding: free text in, best candidate out.
///
/// `Ok(None)` means the provider answered but had nothing usable. Transport
/// failures come back as `Err` and abort the run.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, query: &str) -> AppResult<Option<Coordinates>>;
}

#[derive(Debug, Deserialize)]
struct ForwardResponse {
    addresses: Option<Vec<ForwardAddress>>,
}

#[derive(Debug, Deserialize)]
struct ForwardAddress {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct RadarGeocoder {
    http: Client,
    endpoint: String,
    api_key: SecretString,
}

impl RadarGeocoder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        timeout_secs: Option<u64>,
    ) -> AppResult<Self> {
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
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .geocode_api_key
            .clone()
            .ok_or_else(|| AppError::Config("RADARIO_API_KEY is not set".into()))?;
        Self::new(
            config.geocode_endpoint.clone(),
            api_key,
            config.http_timeout_secs,
        )
    }
}

#[async_trait]
impl Geocoder for RadarGeocoder {
    async fn forward(&self, query: &str) -> AppResult<Option<Coordinates>> {
        let response = self
            .http
            .get(&self.endpoint)
            .header(AUTHORIZATION, self.api_key.expose_secret())
            .query(&[("query", query)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(first_candidate(query, &body))
    }
}

fn first_candidate(query: &str, body: &str) -> Option<Coordinates> {
    let parsed = match serde_json::from_str::<ForwardResponse>(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(?err, query, "geocode response was not the expected shape");
            return None;
        }
    };
    let Some(address) = parsed.addresses.and_then(|list| list.into_iter().next()) else {
        debug!(query, "geocoder returned no candidates");
        return None;
    };
    match (address.latitude, address.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => {
            warn!(query, "first geocode candidate is missing coordinates");
            None
        }
    }
}

/// Defers the missing-key error until something actually needs a lookup.
pub struct UnconfiguredGeocoder;

#[async_trait]
impl Geocoder for UnconfiguredGeocoder {
    async fn forward(&self, _query: &str) -> AppResult<Option<Coordinates>> {
        Err(AppError::Config(
            "RADARIO_API_KEY is not set; cannot geocode rows without coordinates".into(),
        ))
    }
}

pub fn geocoder_from_config(config: &AppConfig) -> AppResult<Arc<dyn Geocoder>> {
    if config.geocode_api_key.is_some() {
        Ok(Arc::new(RadarGeocoder::from_config(config)?))
    } else {
        Ok(Arc::new(UnconfiguredGeocoder))
    }
}
