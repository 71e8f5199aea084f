pub mod address;
pub mod cache;
pub mod config;
pub mod errors;
pub mod feed;
pub mod geocode;
pub mod google;
pub mod nominatim;
pub mod refresh;
pub mod season;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::address::{Address, Coordinates};
pub use crate::cache::{SnapshotStore, TournamentEntry};
pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::feed::{FeedClient, Tournament, TournamentSource};
pub use crate::geocode::{GeocodeProvider, GeocodeResult, ProviderChain, RequestPacer};
pub use crate::google::GoogleGeocoder;
pub use crate::nominatim::NominatimGeocoder;
pub use crate::refresh::{RefreshJob, RefreshStats};
pub use crate::season::Season;

/// Idempotent; later calls are no-ops so tests and the binary can both call
/// it freely.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,tournament_scout=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
