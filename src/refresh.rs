use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::address::{Address, Coordinates};
use crate::cache::{SnapshotStore, TournamentEntry};
use crate::errors::{AppError, AppResult};
use crate::feed::TournamentSource;
use crate::geocode::{GeocodeResult, ProviderChain, RequestPacer};
use crate::season::Season;

const CURRENT_SEASON_RETRIES: u32 = 3;
const HISTORICAL_RETRIES: u32 = 1;

/// Aggregate outcome of one refresh run. Per-address failures are recorded in
/// the cache and counted here; they never fail the run itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefreshStats {
    pub fetched: usize,
    pub already_resolved: usize,
    pub invalid: usize,
    pub geocoded: usize,
    pub failed: usize,
}

struct QueuedLookup {
    entry_index: usize,
    address: Address,
}

/// Drives one end-to-end refresh: fetch the window from the feed, classify
/// each tournament against the caches, geocode what is missing at a paced
/// rate, and persist the merged snapshots. Strictly sequential; a try-lock
/// guard rejects overlapping runs instead of letting them race on the
/// snapshot files.
pub struct RefreshJob {
    source: Arc<dyn TournamentSource>,
    chain: ProviderChain,
    tournaments: SnapshotStore<TournamentEntry>,
    geocodes: SnapshotStore<GeocodeResult>,
    pacer: RequestPacer,
    guard: AsyncMutex<()>,
}

impl RefreshJob {
    pub fn new(
        source: Arc<dyn TournamentSource>,
        chain: ProviderChain,
        tournaments: SnapshotStore<TournamentEntry>,
        geocodes: SnapshotStore<GeocodeResult>,
        pacer: RequestPacer,
    ) -> Self {
        Self {
            source,
            chain,
            tournaments,
            geocodes,
            pacer,
            guard: AsyncMutex::new(()),
        }
    }

    pub async fn refresh(
        &self,
        after: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<RefreshStats> {
        let _running = self.guard.try_lock().map_err(|_| AppError::Busy)?;

        let is_current_season = Season::current().contains_window(after, before);
        let max_retries = if is_current_season {
            CURRENT_SEASON_RETRIES
        } else {
            HISTORICAL_RETRIES
        };

        // FETCH. Current-season data is critical; historical windows degrade
        // to a warning and an early, successful stop.
        let fetched = match self.source.fetch(after, before, max_retries).await {
            Ok(tournaments) => tournaments,
            Err(err) if is_current_season => return Err(err),
            Err(err) => {
                warn!(%err, "historical feed fetch failed; leaving cache untouched");
                return Ok(RefreshStats::default());
            }
        };

        if fetched.is_empty() {
            if is_current_season {
                return Err(AppError::Upstream(
                    "feed returned no tournaments for the current-season window".into(),
                ));
            }
            warn!("no tournaments found in historical window");
            return Ok(RefreshStats::default());
        }

        let mut stats = RefreshStats {
            fetched: fetched.len(),
            ..RefreshStats::default()
        };

        // CLASSIFY. Entries are rebuilt from the feed every run; coordinates
        // already known to either cache are copied forward without a lookup.
        let mut entries: Vec<TournamentEntry> = Vec::with_capacity(fetched.len());
        let mut queue: Vec<QueuedLookup> = Vec::new();

        for tournament in &fetched {
            let mut entry = TournamentEntry::from_feed(tournament);

            if let Some(prior) = self.tournaments.get(&entry.cache_key()) {
                if let Some(coordinates) = prior.address.coordinates() {
                    entry.address.set_coordinates(Some(coordinates));
                    entry.address.failed = prior.address.failed;
                    stats.already_resolved += 1;
                    entries.push(entry);
                    continue;
                }
            }

            if entry.address.coordinates().is_some() {
                stats.already_resolved += 1;
                entries.push(entry);
                continue;
            }

            if !entry.address.is_valid() {
                entry.address.failed = true;
                stats.invalid += 1;
                entries.push(entry);
                continue;
            }

            if let Some(cached) = self.geocodes.get(&entry.address.cache_key()) {
                if let Some(coordinates) = cached.coordinates() {
                    entry.address.set_coordinates(Some(coordinates));
                    entry.address.failed = false;
                    stats.already_resolved += 1;
                    entries.push(entry);
                    continue;
                }
            }

            queue.push(QueuedLookup {
                entry_index: entries.len(),
                address: entry.address.clone(),
            });
            entries.push(entry);
        }

        // GEOCODE. In fetch order, one paced request per distinct venue
        // address; tournaments sharing a venue share the lookup.
        let mut resolved_this_run: HashMap<String, Option<Coordinates>> = HashMap::new();
        let mut geocode_records: Vec<(String, GeocodeResult)> = Vec::new();

        for lookup in &queue {
            let key = lookup.address.cache_key();
            let coordinates = match resolved_this_run.get(&key) {
                Some(previous) => *previous,
                None => {
                    self.pacer.wait().await;
                    let outcome = self.chain.resolve(&lookup.address).await;
                    if let Err(err) = &outcome {
                        warn!(
                            address = %lookup.address.full_address(),
                            %err,
                            "geocoding failed for venue"
                        );
                    }
                    let record = GeocodeResult::from_outcome(&lookup.address, &outcome);
                    geocode_records.push((key.clone(), record));
                    let coordinates = outcome.ok();
                    resolved_this_run.insert(key, coordinates);
                    coordinates
                }
            };

            let entry = &mut entries[lookup.entry_index];
            entry.address.set_coordinates(coordinates);
            entry.address.failed = coordinates.is_none();
            if coordinates.is_some() {
                stats.geocoded += 1;
            } else {
                stats.failed += 1;
            }
        }

        // PERSIST. Whole-set merge into both snapshots.
        self.tournaments
            .merge_and_save(entries.into_iter().map(|entry| (entry.cache_key(), entry)))?;
        if !geocode_records.is_empty() {
            self.geocodes.merge_and_save(geocode_records)?;
        }

        info!(
            fetched = stats.fetched,
            already_resolved = stats.already_resolved,
            geocoded = stats.geocoded,
            failed = stats.failed,
            invalid = stats.invalid,
            "refresh run completed"
        );
        Ok(stats)
    }
}
