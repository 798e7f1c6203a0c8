use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::enrich::{EnrichmentStats, Enricher};
use crate::errors::AppResult;
use crate::fetch::{RegistrySource, SheetClient};
use crate::geocode::geocoder_from_config;
use crate::history::RunHistory;
use crate::reconcile::reconcile_with_stats;
use crate::registry::Dataset;
use crate::store::RegistryStore;
use crate::validate::{drop_unlocated, validate};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Run every stage including validation but leave the registry file alone.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub remote_rows: usize,
    pub previous_rows: usize,
    pub carried_forward: usize,
    pub enrichment: EnrichmentStats,
    pub dropped: usize,
    pub persisted_rows: usize,
    pub fingerprint: String,
    pub changed: bool,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

/// Fetch, reconcile, enrich, validate, persist.
pub struct SyncPipeline {
    source: Arc<dyn RegistrySource>,
    enricher: Enricher,
    store: RegistryStore,
    history: RunHistory,
}

impl SyncPipeline {
    pub fn new(source: Arc<dyn RegistrySource>, enricher: Enricher, store: RegistryStore) -> Self {
        Self {
            source,
            enricher,
            store,
            history: RunHistory::disabled(),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let source = Arc::new(SheetClient::from_config(config)?);
        let enricher = Enricher::new(geocoder_from_config(config)?)
            .with_concurrency(config.geocode_concurrency);
        let store = RegistryStore::new(config.registry_path());
        let history = RunHistory::new(&config.data_dir, config);
        Ok(Self::new(source, enricher, store).with_history(history))
    }

    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = history;
        self
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Runs one sync. Any error leaves the persisted registry untouched.
    pub async fn run(&self, options: SyncOptions) -> AppResult<SyncReport> {
        let started = Instant::now();
        let result = self.execute(options, started).await;

        match &result {
            Ok(report) => self.history.record(
                "sync_succeeded",
                serde_json::to_value(report).unwrap_or(serde_json::Value::Null),
            ),
            Err(err) => self.history.record(
                "sync_aborted",
                json!({
                    "kind": err.kind(),
                    "error": err.to_string(),
                    "dry_run": options.dry_run,
                    "elapsed_ms": elapsed_ms(started),
                }),
            ),
        }
        if let Err(err) = self.history.flush() {
            warn!(?err, "failed to write run history");
        }
        result
    }

    async fn execute(&self, options: SyncOptions, started: Instant) -> AppResult<SyncReport> {
        let remote = self.source.fetch_remote_dataset().await?;
        let previous = self.store.load_previous()?;
        let remote_rows = remote.len();

        let (reconciled, reconcile_stats) = reconcile_with_stats(remote, &previous);
        let columns = reconciled.columns().to_vec();
        let (enriched, enrichment) = self.enricher.enrich_all(reconciled.into_records()).await?;

        let (located, dropped) = drop_unlocated(enriched);
        let candidate = Dataset::new(columns, located);
        validate(&candidate, &previous)?;

        let changed = candidate != previous;
        let fingerprint = candidate.fingerprint()?;
        if options.dry_run {
            info!(rows = candidate.len(), changed, "dry run; registry not written");
        } else {
            self.store.persist(&candidate)?;
        }

        let report = SyncReport {
            remote_rows,
            previous_rows: previous.len(),
            carried_forward: reconcile_stats.carried_forward,
            enrichment,
            dropped,
            persisted_rows: candidate.len(),
            fingerprint,
            changed,
            dry_run: options.dry_run,
            elapsed_ms: elapsed_ms(started),
        };
        info!(
            remote = report.remote_rows,
            previous = report.previous_rows,
            geocoded = report.enrichment.geocoded,
            dropped = report.dropped,
            persisted = report.persisted_rows,
            changed = report.changed,
            "registry sync complete"
        );
        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
