use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use tracing::debug;

const DEFAULT_FEED_BASE_URL: &str = "https://apiv2.fftt.com/api";
const DEFAULT_FEED_REFERER: &str = "https://monclub.fftt.com/";
const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_GOOGLE_GEOCODING_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const DEFAULT_GEOCODE_PACE_MS: u64 = 1_500;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 21_600;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub feed_base_url: String,
    pub feed_referer: String,
    pub nominatim_base_url: String,
    pub nominatim_user_agent: String,
    pub google_geocoding_base_url: String,
    pub google_geocoding_api_key: Option<SecretString>,
    pub geocode_pace_ms: u64,
    pub http_timeout_secs: u64,
    pub cache_dir: PathBuf,
    pub refresh_interval_secs: u64,
    pub backfill_last_season: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            feed_base_url: parse_url("FEED_BASE_URL", DEFAULT_FEED_BASE_URL),
            feed_referer: env::var("FEED_REFERER").unwrap_or_else(|_| DEFAULT_FEED_REFERER.into()),
            nominatim_base_url: parse_url("NOMINATIM_BASE_URL", DEFAULT_NOMINATIM_BASE_URL),
            nominatim_user_agent: env::var("NOMINATIM_USER_AGENT").unwrap_or_else(|_| {
                format!(
                    "{}/{} (tournament venue geocoder)",
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION")
                )
            }),
            google_geocoding_base_url: parse_url(
                "GOOGLE_GEOCODING_BASE_URL",
                DEFAULT_GOOGLE_GEOCODING_BASE_URL,
            ),
            google_geocoding_api_key: env::var("GOOGLE_GEOCODING_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocode_pace_ms: parse_u64("GEOCODE_PACE_MS", DEFAULT_GEOCODE_PACE_MS),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS).max(1),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            refresh_interval_secs: parse_u64("REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS),
            backfill_last_season: parse_bool("BACKFILL_LAST_SEASON", false),
        }
    }

    pub fn has_google_geocoding_key(&self) -> bool {
        self.google_geocoding_api_key.is_some()
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_url(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}
