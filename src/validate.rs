use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::registry::{Dataset, Record};

/// Removes rows that still lack a coordinate after enrichment. Returns the
/// surviving rows and how many were dropped.
pub fn drop_unlocated(records: Vec<Record>) -> (Vec<Record>, usize) {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| {
            let located = record.has_coordinates();
            if !located {
                info!(
                    timestamp = %record.timestamp,
                    city = record.city.as_deref().unwrap_or_default(),
                    "dropping row without coordinates"
                );
            }
            located
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

pub fn all_coordinates_present(dataset: &Dataset) -> bool {
    dataset.records().iter().all(Record::has_coordinates)
}

pub fn size_non_decreasing(new_dataset: &Dataset, previous_dataset: &Dataset) -> bool {
    new_dataset.len() >= previous_dataset.len()
}

/// Both persistence gates. Each failure maps to its own error variant.
pub fn validate(new_dataset: &Dataset, previous_dataset: &Dataset) -> AppResult<()> {
    if !all_coordinates_present(new_dataset) {
        let missing = new_dataset
            .records()
            .iter()
            .filter(|record| !record.has_coordinates())
            .count();
        warn!(missing, "refusing to persist rows without coordinates");
        return Err(AppError::IncompleteCoordinates { missing });
    }
    if !size_non_decreasing(new_dataset, previous_dataset) {
        warn!(
            previous = previous_dataset.len(),
            current = new_dataset.len(),
            "refusing to persist a smaller registry"
        );
        return Err(AppError::RowCountRegression {
            previous: previous_dataset.len(),
            current: new_dataset.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(timestamp: &str) -> Record {
        Record {
            timestamp: timestamp.into(),
            latitude: Some(1.0),
            longitude: Some(2.0),
            ..Record::default()
        }
    }

    fn unlocated(timestamp: &str) -> Record {
        Record {
            timestamp: timestamp.into(),
            latitude: Some(1.0),
            ..Record::default()
        }
    }

    #[test]
    fn drops_rows_missing_either_coordinate() {
        let (kept, dropped) = drop_unlocated(vec![located("a"), unlocated("b"), located("c")]);
        assert_eq!(dropped, 1);
        let stamps: Vec<_> = kept.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["a", "c"]);
    }

    #[test]
    fn completeness_check_flags_partial_rows() {
        let complete = Dataset::with_standard_columns(vec![located("a")]);
        let partial = Dataset::with_standard_columns(vec![located("a"), unlocated("b")]);
        assert!(all_coordinates_present(&complete));
        assert!(!all_coordinates_present(&partial));
        assert!(all_coordinates_present(&Dataset::default()));
    }

    #[test]
    fn size_check_allows_equal_and_growth() {
        let one = Dataset::with_standard_columns(vec![located("a")]);
        let two = Dataset::with_standard_columns(vec![located("a"), located("b")]);
        assert!(size_non_decreasing(&one, &one));
        assert!(size_non_decreasing(&two, &one));
        assert!(!size_non_decreasing(&one, &two));
    }

    #[test]
    fn reports_distinct_errors() {
        let previous = Dataset::with_standard_columns(vec![located("a"), located("b")]);

        let partial = Dataset::with_standard_columns(vec![located("a"), unlocated("b")]);
        assert!(matches!(
            validate(&partial, &previous),
            Err(AppError::IncompleteCoordinates { missing: 1 })
        ));

        let shrunk = Dataset::with_standard_columns(vec![located("a")]);
        assert!(matches!(
            validate(&shrunk, &previous),
            Err(AppError::RowCountRegression {
                previous: 2,
                current: 1
            })
        ));

        assert!(validate(&previous, &previous).is_ok());
    }
}
