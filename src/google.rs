use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::address::{Address, Coordinates};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geocode::GeocodeProvider;

/// Fallback geocoding backend. Requires an API credential from configuration;
/// running without one is a configuration error on first use, never retried.
pub struct GoogleGeocoder {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GoogleGeocoder {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: config.google_geocoding_base_url.clone(),
            api_key: config.google_geocoding_api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeHit>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl GeocodeProvider for GoogleGeocoder {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn try_resolve(&self, address: &Address) -> AppResult<Coordinates> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            AppError::Config("GOOGLE_GEOCODING_API_KEY is not set; fallback geocoder unavailable".into())
        })?;

        let full_address = address.full_address();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("address", full_address.as_str()),
                ("key", api_key.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status(status.as_u16()));
        }

        let parsed: GeocodeResponse = response
            .json()
            .await
            .map_err(|err| AppError::Parse(format!("fallback geocoder response: {err}")))?;

        if parsed.status != "OK" || parsed.results.is_empty() {
            let detail = parsed
                .error_message
                .unwrap_or_else(|| parsed.status.clone());
            return Err(AppError::NoMatch(format!("{full_address} ({detail})")));
        }

        let location = &parsed.results[0].geometry.location;
        Ok(Coordinates::new(location.lat, location.lng))
    }
}
