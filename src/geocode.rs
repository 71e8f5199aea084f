use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::address::{Address, Coordinates};
use crate::errors::{AppError, AppResult};

const PROVIDER_MAX_ATTEMPTS: u32 = 3;
const PROVIDER_RETRY_DELAY_SECS: u64 = 5;

/// One geocoding backend. `try_resolve` performs a single lookup; `resolve`
/// wraps it with the shared retry policy: transient failures get up to three
/// attempts with linear backoff, a `NoMatch` or configuration error ends the
/// attempt immediately so the chain can fall back.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_resolve(&self, address: &Address) -> AppResult<Coordinates>;

    async fn resolve(&self, address: &Address) -> AppResult<Coordinates> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_resolve(address).await {
                Ok(coordinates) => return Ok(coordinates),
                Err(err) if attempt < PROVIDER_MAX_ATTEMPTS && err.is_transient() => {
                    let delay =
                        Duration::from_secs(PROVIDER_RETRY_DELAY_SECS * u64::from(attempt));
                    warn!(
                        provider = self.name(),
                        attempt,
                        %err,
                        ?delay,
                        "geocode attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Ordered two-provider fallback. Each provider retries internally; the chain
/// itself tries each at most once and reports the fallback's error when both
/// sides give up.
pub struct ProviderChain {
    primary: Arc<dyn GeocodeProvider>,
    fallback: Arc<dyn GeocodeProvider>,
}

impl ProviderChain {
    pub fn new(primary: Arc<dyn GeocodeProvider>, fallback: Arc<dyn GeocodeProvider>) -> Self {
        Self { primary, fallback }
    }

    pub async fn resolve(&self, address: &Address) -> AppResult<Coordinates> {
        match self.primary.resolve(address).await {
            Ok(coordinates) => Ok(coordinates),
            Err(err) => {
                warn!(
                    provider = self.primary.name(),
                    %err,
                    "primary geocoder failed; trying fallback"
                );
                self.fallback.resolve(address).await
            }
        }
    }
}

/// Record of exactly one geocode attempt for a venue address, successful or
/// not. A new attempt produces a new record; existing records are never
/// mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub failed: bool,
    pub timestamp: DateTime<Utc>,
}

impl GeocodeResult {
    pub fn from_outcome(address: &Address, outcome: &AppResult<Coordinates>) -> Self {
        let mut address = address.clone();
        match outcome {
            Ok(coordinates) => {
                address.set_coordinates(Some(*coordinates));
                address.failed = false;
                Self {
                    latitude: Some(coordinates.latitude),
                    longitude: Some(coordinates.longitude),
                    failed: false,
                    address,
                    timestamp: Utc::now(),
                }
            }
            Err(_) => {
                address.set_coordinates(None);
                address.failed = true;
                Self {
                    latitude: None,
                    longitude: None,
                    failed: true,
                    address,
                    timestamp: Utc::now(),
                }
            }
        }
    }

    /// Legacy snapshots use a literal `(0,0)` pair to mean "unset"; that pair
    /// maps to `None` here, as it does on `Address`.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => {
                Some(Coordinates::new(lat, lon))
            }
            _ => None,
        }
    }
}

/// Enforces the minimum spacing the backends' usage policies require between
/// consecutive requests. Sequential by design: the pipeline never issues
/// geocode calls concurrently.
pub struct RequestPacer {
    interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ScriptedProvider {
        name: &'static str,
        calls: AtomicUsize,
        responses: parking_lot::Mutex<Vec<AppResult<Coordinates>>>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, responses: Vec<AppResult<Coordinates>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                responses: parking_lot::Mutex::new(responses),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeocodeProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn try_resolve(&self, _address: &Address) -> AppResult<Coordinates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Err(AppError::NoMatch("script exhausted".into())))
        }
    }

    fn paris() -> Coordinates {
        Coordinates::new(48.8566, 2.3522)
    }

    fn address() -> Address {
        Address {
            street_address: "12 rue des Sports".into(),
            postal_code: "75000".into(),
            address_locality: "Paris".into(),
            ..Address::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_with_backoff() {
        let provider = ScriptedProvider::new(
            "flaky",
            vec![Ok(paris()), Err(AppError::Status(502)), Err(AppError::Status(500))],
        );

        let resolved = provider.resolve(&address()).await.unwrap();
        assert_eq!(resolved, paris());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn no_match_is_terminal_for_the_provider() {
        let provider = ScriptedProvider::new(
            "strict",
            vec![Ok(paris()), Err(AppError::NoMatch("nothing here".into()))],
        );

        let err = provider.resolve(&address()).await.unwrap_err();
        assert!(matches!(err, AppError::NoMatch(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_wins_when_primary_errors() {
        let primary =
            ScriptedProvider::new("primary", vec![Err(AppError::NoMatch("unknown".into()))]);
        let fallback = ScriptedProvider::new("fallback", vec![Ok(paris())]);
        let chain = ProviderChain::new(primary.clone(), fallback.clone());

        let resolved = chain.resolve(&address()).await.unwrap();
        assert_eq!(resolved, paris());
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn both_providers_failing_reports_the_fallback_error() {
        let primary =
            ScriptedProvider::new("primary", vec![Err(AppError::NoMatch("primary miss".into()))]);
        let fallback = ScriptedProvider::new(
            "fallback",
            vec![Err(AppError::Config("fallback key missing".into()))],
        );
        let chain = ProviderChain::new(primary.clone(), fallback.clone());

        let err = chain.resolve(&address()).await.unwrap_err();
        assert!(err.to_string().contains("fallback key missing"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn chain_never_retries_across_providers() {
        let primary = ScriptedProvider::new(
            "primary",
            vec![Err(AppError::NoMatch("miss".into()))],
        );
        let fallback = ScriptedProvider::new(
            "fallback",
            vec![Err(AppError::NoMatch("also miss".into()))],
        );
        let chain = ProviderChain::new(primary.clone(), fallback.clone());

        let _ = chain.resolve(&address()).await;
        let _ = chain.resolve(&address()).await;
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_consecutive_requests() {
        let pacer = RequestPacer::new(Duration::from_millis(1_500));

        pacer.wait().await;
        let before = Instant::now();
        pacer.wait().await;
        assert!(before.elapsed() >= Duration::from_millis(1_500));
    }

    #[test]
    fn result_from_success_carries_coordinates() {
        let result = GeocodeResult::from_outcome(&address(), &Ok(paris()));
        assert!(!result.failed);
        assert_eq!(result.coordinates(), Some(paris()));
        assert_eq!(result.address.coordinates(), Some(paris()));
    }

    #[test]
    fn result_with_legacy_zero_pair_reports_unset() {
        let mut result = GeocodeResult::from_outcome(&address(), &Ok(paris()));
        result.latitude = Some(0.0);
        result.longitude = Some(0.0);
        assert_eq!(result.coordinates(), None);
    }

    #[test]
    fn result_from_failure_is_marked_and_empty() {
        let outcome = Err(AppError::NoMatch("nowhere".into()));
        let result = GeocodeResult::from_outcome(&address(), &outcome);
        assert!(result.failed);
        assert!(result.address.failed);
        assert_eq!(result.coordinates(), None);
    }
}
