use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::errors::{AppError, AppResult};

pub const TIMESTAMP_COLUMN: &str = "Timestamp";
pub const CITY_COLUMN: &str = "City";
pub const REGION_COLUMN: &str = "State, Region or Province";
pub const COUNTRY_COLUMN: &str = "Country";
pub const ORGANIZATION_COLUMN: &str = "Organization Name ( Optional: Add if you want displayed )";
pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";

const REQUIRED_COLUMNS: &[&str] = &[
    TIMESTAMP_COLUMN,
    CITY_COLUMN,
    REGION_COLUMN,
    COUNTRY_COLUMN,
    ORGANIZATION_COLUMN,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One registry row. Columns the pipeline does not interpret are carried
/// verbatim in `extra`, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub timestamp: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub organization_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

/// Exact-match reconciliation key. Missing values compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    timestamp: String,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    organization_name: Option<String>,
}

impl Record {
    pub fn join_key(&self) -> JoinKey {
        JoinKey {
            timestamp: self.timestamp.clone(),
            city: self.city.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            organization_name: self.organization_name.clone(),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates().is_some()
    }

    pub fn set_coordinates(&mut self, coordinates: Option<Coordinates>) {
        self.latitude = coordinates.map(|c| c.latitude);
        self.longitude = coordinates.map(|c| c.longitude);
    }

    fn field(&self, column: &str) -> String {
        match column {
            TIMESTAMP_COLUMN => self.timestamp.clone(),
            CITY_COLUMN => self.city.clone().unwrap_or_default(),
            REGION_COLUMN => self.region.clone().unwrap_or_default(),
            COUNTRY_COLUMN => self.country.clone().unwrap_or_default(),
            ORGANIZATION_COLUMN => self.organization_name.clone().unwrap_or_default(),
            LATITUDE_COLUMN => format_coordinate(self.latitude),
            LONGITUDE_COLUMN => format_coordinate(self.longitude),
            other => self.extra.get(other).cloned().unwrap_or_default(),
        }
    }
}

/// Ordered rows plus the header they are written under.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Dataset {
    /// Builds a dataset, appending the coordinate columns when the header lacks them.
    pub fn new(mut columns: Vec<String>, records: Vec<Record>) -> Self {
        for column in [LATITUDE_COLUMN, LONGITUDE_COLUMN] {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        Self { columns, records }
    }

    pub fn with_standard_columns(records: Vec<Record>) -> Self {
        let columns = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        Self::new(columns, records)
    }

    /// Reads a registry we wrote ourselves; a non-numeric coordinate is an error.
    pub fn from_reader<R: Read>(reader: R) -> AppResult<Self> {
        Self::decode(reader, CoordinatePolicy::Strict)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> AppResult<Self> {
        Self::from_reader(bytes)
    }

    /// Reads the hand-edited sheet export. Coordinate cells that do not parse
    /// are treated as missing.
    pub fn from_sheet_bytes(bytes: &[u8]) -> AppResult<Self> {
        Self::decode(bytes, CoordinatePolicy::Lenient)
    }

    fn decode<R: Read>(reader: R, policy: CoordinatePolicy) -> AppResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        validate_header(&columns)?;

        let mut records = Vec::new();
        for (index, row) in csv_reader.records().enumerate() {
            let row = row?;
            records.push(decode_row(&columns, &row, index + 2, policy)?);
        }
        Ok(Self::new(columns, records))
    }

    pub fn write_to<W: Write>(&self, writer: W) -> AppResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for record in &self.records {
            csv_writer.write_record(self.columns.iter().map(|column| record.field(column)))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> AppResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    /// SHA-256 of the serialized CSV, used to tell whether a run changed anything.
    pub fn fingerprint(&self) -> AppResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_csv_bytes()?);
        Ok(STANDARD_NO_PAD.encode(hasher.finalize()))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Same header, different rows.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            columns: self.columns.clone(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn validate_header(columns: &[String]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(AppError::Parse(format!("duplicate column header: {column}")));
        }
    }
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !seen.contains(required))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Parse(format!(
            "registry header missing column(s): {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatePolicy {
    Strict,
    Lenient,
}

fn decode_row(
    columns: &[String],
    row: &StringRecord,
    line: usize,
    policy: CoordinatePolicy,
) -> AppResult<Record> {
    let mut record = Record::default();
    for (column, value) in columns.iter().zip(row.iter()) {
        match column.as_str() {
            TIMESTAMP_COLUMN => record.timestamp = value.to_string(),
            CITY_COLUMN => record.city = optional_text(value),
            REGION_COLUMN => record.region = optional_text(value),
            COUNTRY_COLUMN => record.country = optional_text(value),
            ORGANIZATION_COLUMN => record.organization_name = optional_text(value),
            LATITUDE_COLUMN => record.latitude = parse_coordinate(value, column, line, policy)?,
            LONGITUDE_COLUMN => record.longitude = parse_coordinate(value, column, line, policy)?,
            other => {
                record.extra.insert(other.to_string(), value.to_string());
            }
        }
    }
    Ok(record)
}

fn optional_text(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_coordinate(
    value: &str,
    column: &str,
    line: usize,
    policy: CoordinatePolicy,
) -> AppResult<Option<f64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) if policy == CoordinatePolicy::Lenient => {
            warn!(line, column, value = trimmed, %err, "ignoring non-numeric coordinate");
            Ok(None)
        }
        Err(err) => Err(AppError::Parse(format!(
            "line {line}: invalid {column} {trimmed:?}: {err}"
        ))),
    }
}

fn format_coordinate(value: Option<f64>) -> String {
    value.map(|v| format!("{v:?}")).unwrap_or_default()
}
