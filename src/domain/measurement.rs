//! Raw measurement records for one wind farm location.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// Wind farm location index (1-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Location(u8);

impl Location {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn index(&self) -> u8 {
        self.0
    }

    /// File name of the location's measurement export
    pub fn file_name(&self) -> String {
        format!("Location{}.csv", self.0)
    }
}

impl TryFrom<u8> for Location {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PipelineError::Config(format!(
                "location must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }
}

impl From<Location> for u8 {
    fn from(location: Location) -> Self {
        location.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location {}", self.0)
    }
}

/// One hourly observation: weather at the turbine site plus normalized power output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub time: NaiveDateTime,
    /// Temperature at 2m (°C)
    pub temperature: f64,
    /// Relative humidity at 2m (%)
    pub humidity: f64,
    /// Dewpoint at 2m (°C)
    pub dewpoint: f64,
    /// Wind speed at 10m (m/s)
    pub wind_speed_10m: f64,
    /// Wind speed at 100m (m/s)
    pub wind_speed_100m: f64,
    /// Wind direction at 10m (degrees)
    pub wind_direction_10m: f64,
    /// Wind direction at 100m (degrees)
    pub wind_direction_100m: f64,
    /// Wind gusts at 10m (m/s)
    pub wind_gusts: f64,
    /// Observed power output
    pub power: f64,
}

/// Time-ordered measurements for a single location
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    location: Option<Location>,
    records: Vec<MeasurementRecord>,
}

impl MeasurementTable {
    /// Build a table, rejecting empty input and timestamps that are not strictly increasing
    pub fn new(location: Option<Location>, records: Vec<MeasurementRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(PipelineError::Data("measurement table is empty".to_string()));
        }

        if let Some(pair) = records.windows(2).find(|w| w[1].time <= w[0].time) {
            return Err(PipelineError::Data(format!(
                "timestamps must be strictly increasing: {} is followed by {}",
                pair[0].time, pair[1].time
            )));
        }

        Ok(Self { location, records })
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            rows: self.records.len(),
            time_range: self
                .records
                .first()
                .zip(self.records.last())
                .map(|(first, last)| (first.time, last.time)),
        }
    }
}

/// Reporting metadata for a loaded table; not used by the pipeline itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub time_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_range {
            Some((start, end)) => write!(f, "{} rows, {} to {}", self.rows, start, end),
            None => write!(f, "{} rows", self.rows),
        }
    }
}
