use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Parse(String),
    #[error("incomplete coordinates: {missing} row(s) lack latitude or longitude")]
    IncompleteCoordinates { missing: usize },
    #[error("row count regression: {current} row(s) would replace {previous}")]
    RowCountRegression { previous: usize, current: usize },
}

impl AppError {
    /// Short machine-readable label used in the run history.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Http(_) => "transport",
            AppError::Csv(_) | AppError::Parse(_) => "malformed_table",
            AppError::Json(_) => "json",
            AppError::Config(_) => "config",
            AppError::IncompleteCoordinates { .. } => "incomplete_coordinates",
            AppError::RowCountRegression { .. } => "row_count_regression",
        }
    }
}
