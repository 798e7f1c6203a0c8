mod cli;
mod config;
mod enrich;
mod errors;
mod fetch;
mod geocode;
mod history;
mod pipeline;
mod reconcile;
mod registry;
mod store;
mod validate;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cli::{Cli, OutputFormat};
pub use config::{AppConfig, PublicAppConfig};
pub use enrich::{location_query, EnrichmentStats, Enricher};
pub use errors::{AppError, AppResult};
pub use fetch::{RegistrySource, SheetClient};
pub use geocode::{geocoder_from_config, Geocoder, RadarGeocoder, UnconfiguredGeocoder};
pub use history::{HistoryEvent, RunHistory};
pub use pipeline::{SyncOptions, SyncPipeline, SyncReport};
pub use reconcile::{reconcile, reconcile_with_stats, ReconcileStats};
pub use registry::{
    Coordinates, Dataset, JoinKey, Record, CITY_COLUMN, COUNTRY_COLUMN, LATITUDE_COLUMN,
    LONGITUDE_COLUMN, ORGANIZATION_COLUMN, REGION_COLUMN, TIMESTAMP_COLUMN,
};
pub use store::RegistryStore;
pub use validate::{all_coordinates_present, drop_unlocated, size_non_decreasing, validate};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,registry_sync=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    });
}
