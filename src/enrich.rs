use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, trace};

use crate::errors::AppResult;
use crate::geocode::Geocoder;
use crate::registry::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    AlreadyLocated,
    Geocoded,
    Unresolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub total_rows: usize,
    pub already_located: usize,
    pub geocoder_calls: usize,
    pub geocoded: usize,
    pub unresolved: usize,
}

impl EnrichmentStats {
    fn observe(&mut self, outcome: Outcome) {
        self.total_rows += 1;
        match outcome {
            Outcome::AlreadyLocated => self.already_located += 1,
            Outcome::Geocoded => {
                self.geocoder_calls += 1;
                self.geocoded += 1;
            }
            Outcome::Unresolved => {
                self.geocoder_calls += 1;
                self.unresolved += 1;
            }
        }
    }
}

/// Free-text query for a row: city, region and country separated by single
/// spaces, with missing parts left empty.
pub fn location_query(record: &Record) -> String {
    format!(
        "{} {} {}",
        record.city.as_deref().unwrap_or_default(),
        record.region.as_deref().unwrap_or_default(),
        record.country.as_deref().unwrap_or_default()
    )
}

#[derive(Clone)]
pub struct Enricher {
    geocoder: Arc<dyn Geocoder>,
    concurrency: usize,
}

impl Enricher {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fills in coordinates for a single row. Rows that already have both
    /// coordinates are returned untouched without a lookup.
    pub async fn enrich(&self, record: Record) -> AppResult<Record> {
        self.enrich_row(record).await.map(|(record, _)| record)
    }

    /// Enriches every row. Output order matches input order regardless of
    /// concurrency; the first transport error aborts the whole batch.
    pub async fn enrich_all(
        &self,
        records: Vec<Record>,
    ) -> AppResult<(Vec<Record>, EnrichmentStats)> {
        let results: Vec<(Record, Outcome)> = stream::iter(records)
            .map(|record| self.enrich_row(record))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut stats = EnrichmentStats::default();
        let mut enriched = Vec::with_capacity(results.len());
        for (record, outcome) in results {
            stats.observe(outcome);
            enriched.push(record);
        }
        debug!(
            rows = stats.total_rows,
            calls = stats.geocoder_calls,
            geocoded = stats.geocoded,
            unresolved = stats.unresolved,
            "enrichment finished"
        );
        Ok((enriched, stats))
    }

    async fn enrich_row(&self, mut record: Record) -> AppResult<(Record, Outcome)> {
        if record.has_coordinates() {
            return Ok((record, Outcome::AlreadyLocated));
        }

        let query = location_query(&record);
        match self.geocoder.forward(&query).await? {
            Some(coordinates) => {
                trace!(query = %query, ?coordinates, "row geocoded");
                record.set_coordinates(Some(coordinates));
                Ok((record, Outcome::Geocoded))
            }
            None => {
                debug!(
                    query = %query,
                    timestamp = %record.timestamp,
                    "no geocode result; row left unlocated"
                );
                Ok((record, Outcome::Unresolved))
            }
        }
    }
}
