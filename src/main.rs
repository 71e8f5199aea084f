use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use reqwest::Client;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use tournament_scout::{
    init_tracing, AppConfig, FeedClient, GoogleGeocoder, NominatimGeocoder, ProviderChain,
    RefreshJob, RequestPacer, Season, SnapshotStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();

    let http = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("building the shared HTTP client")?;

    if !config.has_google_geocoding_key() {
        warn!("GOOGLE_GEOCODING_API_KEY is not set; running without the fallback geocoder");
    }

    let source = Arc::new(FeedClient::new(&config).context("building the feed client")?);
    let chain = ProviderChain::new(
        Arc::new(NominatimGeocoder::new(http.clone(), &config)),
        Arc::new(GoogleGeocoder::new(http, &config)),
    );
    let tournaments = SnapshotStore::open(config.cache_dir.join("tournaments.json"))
        .context("loading the tournament snapshot")?;
    let geocodes = SnapshotStore::open(config.cache_dir.join("geocode.json"))
        .context("loading the geocode snapshot")?;
    info!(
        tournaments = tournaments.len(),
        geocodes = geocodes.len(),
        cache_dir = %config.cache_dir.display(),
        "snapshots loaded"
    );

    let job = RefreshJob::new(
        source,
        chain,
        tournaments,
        geocodes,
        RequestPacer::new(Duration::from_millis(config.geocode_pace_ms)),
    );

    if config.backfill_last_season {
        let last = Season::last_finished_at(Utc::now());
        info!(start = %last.start, end = %last.end, "backfilling the last finished season");
        if let Err(err) = job.refresh(last.start, Some(last.end)).await {
            warn!(%err, "historical backfill failed");
        }
    }

    // The startup refresh is load-bearing: without it the service would serve
    // a stale or empty snapshot, so a failure here stops the process.
    job.refresh(Utc::now(), None)
        .await
        .context("startup refresh failed")?;

    if config.refresh_interval_secs == 0 {
        info!("periodic refresh disabled; exiting after the startup run");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the startup run already
    // happened, so consume it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = job.refresh(Utc::now(), None).await {
                    error!(%err, "scheduled refresh failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}
