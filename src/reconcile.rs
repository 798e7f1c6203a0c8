use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::registry::{Coordinates, Dataset, JoinKey, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub remote_rows: usize,
    pub matched: usize,
    pub carried_forward: usize,
    pub duplicate_cached_keys: usize,
}

/// Left join of `remote` against `cached` on [`JoinKey`].
///
/// Each remote row takes its coordinates from the first cached row sharing
/// its key, or none when nothing matches. The result has exactly one row per
/// remote row, in remote order, under the remote header.
pub fn reconcile(remote: Dataset, cached: &Dataset) -> Dataset {
    reconcile_with_stats(remote, cached).0
}

pub fn reconcile_with_stats(remote: Dataset, cached: &Dataset) -> (Dataset, ReconcileStats) {
    let mut stats = ReconcileStats {
        remote_rows: remote.len(),
        ..ReconcileStats::default()
    };

    let mut lookup: HashMap<JoinKey, Option<Coordinates>> = HashMap::with_capacity(cached.len());
    for record in cached.records() {
        let mut fresh = false;
        lookup.entry(record.join_key()).or_insert_with(|| {
            fresh = true;
            record.coordinates()
        });
        if !fresh {
            stats.duplicate_cached_keys += 1;
        }
    }

    let reconciled: Vec<Record> = remote
        .records()
        .iter()
        .cloned()
        .map(|mut record| {
            let carried = match lookup.get(&record.join_key()) {
                Some(coordinates) => {
                    stats.matched += 1;
                    *coordinates
                }
                None => None,
            };
            if carried.is_some() {
                stats.carried_forward += 1;
            }
            record.set_coordinates(carried);
            record
        })
        .collect();

    debug!(
        remote = stats.remote_rows,
        matched = stats.matched,
        carried = stats.carried_forward,
        duplicates = stats.duplicate_cached_keys,
        "reconciled remote rows against cache"
    );
    (remote.with_records(reconciled), stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str, city: Option<&str>, coords: Option<(f64, f64)>) -> Record {
        Record {
            timestamp: timestamp.to_string(),
            city: city.map(str::to_string),
            country: Some("USA".into()),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            ..Record::default()
        }
    }

    #[test]
    fn carries_cached_coordinates_unchanged() {
        let remote = Dataset::with_standard_columns(vec![record("t1", Some("Madison"), None)]);
        let cached =
            Dataset::with_standard_columns(vec![record("t1", Some("Madison"), Some((10.0, 20.0)))]);

        let (out, stats) = reconcile_with_stats(remote, &cached);
        assert_eq!(out.records()[0].latitude, Some(10.0));
        assert_eq!(out.records()[0].longitude, Some(20.0));
        assert_eq!(stats.carried_forward, 1);
    }

    #[test]
    fn unmatched_rows_start_without_coordinates() {
        let remote =
            Dataset::with_standard_columns(vec![record("t2", Some("Austin"), Some((5.0, 5.0)))]);
        let cached =
            Dataset::with_standard_columns(vec![record("t1", Some("Madison"), Some((10.0, 20.0)))]);

        let (out, stats) = reconcile_with_stats(remote, &cached);
        assert!(!out.records()[0].has_coordinates());
        assert_eq!(stats.matched, 0);
    }

    #[test]
    fn key_requires_exact_match_on_every_field() {
        let remote = Dataset::with_standard_columns(vec![record("t1", Some("madison"), None)]);
        let cached =
            Dataset::with_standard_columns(vec![record("t1", Some("Madison"), Some((10.0, 20.0)))]);

        let out = reconcile(remote, &cached);
        assert!(!out.records()[0].has_coordinates());
    }

    #[test]
    fn missing_key_fields_match_each_other() {
        let remote = Dataset::with_standard_columns(vec![record("t1", None, None)]);
        let cached = Dataset::with_standard_columns(vec![record("t1", None, Some((1.5, 2.5)))]);

        let out = reconcile(remote, &cached);
        assert_eq!(out.records()[0].latitude, Some(1.5));
    }

    #[test]
    fn duplicate_cached_keys_take_first_and_do_not_multiply_rows() {
        let remote = Dataset::with_standard_columns(vec![
            record("t1", Some("Madison"), None),
            record("t2", Some("Austin"), None),
        ]);
        let cached = Dataset::with_standard_columns(vec![
            record("t1", Some("Madison"), Some((1.0, 1.0))),
            record("t1", Some("Madison"), Some((9.0, 9.0))),
        ]);

        let (out, stats) = reconcile_with_stats(remote, &cached);
        assert_eq!(out.len(), 2);
        assert_eq!(out.records()[0].latitude, Some(1.0));
        assert_eq!(out.records()[1].city.as_deref(), Some("Austin"));
        assert_eq!(stats.duplicate_cached_keys, 1);
    }

    #[test]
    fn cached_row_without_coordinates_carries_nothing() {
        let remote = Dataset::with_standard_columns(vec![record("t1", Some("Madison"), None)]);
        let cached = Dataset::with_standard_columns(vec![record("t1", Some("Madison"), None)]);

        let (out, stats) = reconcile_with_stats(remote, &cached);
        assert!(!out.records()[0].has_coordinates());
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.carried_forward, 0);
    }
}
