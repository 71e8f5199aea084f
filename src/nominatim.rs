use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

use crate::address::{Address, Coordinates};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geocode::GeocodeProvider;

/// Primary geocoding backend. The usage policy requires a descriptive
/// User-Agent and serial, paced requests; both are enforced by the caller
/// configuration and the pipeline's pacer.
pub struct NominatimGeocoder {
    http: Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: config.nominatim_base_url.clone(),
            user_agent: config.nominatim_user_agent.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

#[async_trait]
impl GeocodeProvider for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn try_resolve(&self, address: &Address) -> AppResult<Coordinates> {
        let full_address = address.full_address();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", full_address.as_str()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT_LANGUAGE, "fr")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status(status.as_u16()));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|err| AppError::Parse(format!("primary geocoder response: {err}")))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NoMatch(full_address.clone()))?;

        // Nominatim serializes coordinates as strings.
        let latitude = hit
            .lat
            .parse::<f64>()
            .map_err(|err| AppError::Parse(format!("primary geocoder latitude: {err}")))?;
        let longitude = hit
            .lon
            .parse::<f64>()
            .map_err(|err| AppError::Parse(format!("primary geocoder longitude: {err}")))?;

        Ok(Coordinates::new(latitude, longitude))
    }
}
