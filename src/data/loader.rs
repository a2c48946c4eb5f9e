use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{Location, MeasurementRecord, MeasurementTable, TableSummary};

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// One CSV row; accepts the export's headers and the short field names
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Time", alias = "time")]
    time: String,
    #[serde(rename = "temperature_2m", alias = "temperature")]
    temperature: f64,
    #[serde(rename = "relativehumidity_2m", alias = "humidity")]
    humidity: f64,
    #[serde(rename = "dewpoint_2m", alias = "dewpoint")]
    dewpoint: f64,
    #[serde(rename = "windspeed_10m")]
    wind_speed_10m: f64,
    #[serde(rename = "windspeed_100m")]
    wind_speed_100m: f64,
    #[serde(rename = "winddirection_10m")]
    wind_direction_10m: f64,
    #[serde(rename = "winddirection_100m")]
    wind_direction_100m: f64,
    #[serde(rename = "windgusts_10m", alias = "windgusts")]
    wind_gusts: f64,
    #[serde(rename = "Power", alias = "power")]
    power: f64,
}

impl CsvRow {
    fn into_record(self) -> Result<MeasurementRecord> {
        Ok(MeasurementRecord {
            time: parse_time(&self.time)?,
            temperature: self.temperature,
            humidity: self.humidity,
            dewpoint: self.dewpoint,
            wind_speed_10m: self.wind_speed_10m,
            wind_speed_100m: self.wind_speed_100m,
            wind_direction_10m: self.wind_direction_10m,
            wind_direction_100m: self.wind_direction_100m,
            wind_gusts: self.wind_gusts,
            power: self.power,
        })
    }
}

pub fn parse_time(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| anyhow!("unrecognised timestamp '{}'", value))
}

/// Reads per-location measurement exports from a directory
#[derive(Debug, Clone)]
pub struct DataLoader {
    dir: PathBuf,
}

impl DataLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, location: Location) -> PathBuf {
        self.dir.join(location.file_name())
    }

    pub fn load(&self, location: Location) -> Result<(MeasurementTable, TableSummary)> {
        let path = self.path_for(location);
        info!(%location, path = %path.display(), "loading measurements");

        let table = Self::load_path(&path, Some(location))?;
        let summary = table.summary();
        info!(%summary, "measurements loaded");
        Ok((table, summary))
    }

    /// Parse one CSV file. Rows are sorted by time; duplicate timestamps are rejected.
    pub fn load_path(path: &Path, location: Option<Location>) -> Result<MeasurementTable> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;

        let mut records = reader
            .deserialize::<CsvRow>()
            .enumerate()
            .map(|(i, row)| {
                row.map_err(anyhow::Error::from)
                    .and_then(CsvRow::into_record)
                    .with_context(|| format!("{}: data row {}", path.display(), i + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        if records.windows(2).any(|w| w[1].time < w[0].time) {
            debug!(path = %path.display(), "sorting rows by time");
            records.sort_by_key(|r| r.time);
        }

        MeasurementTable::new(location, records)
            .with_context(|| format!("building table from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    const EXPORT: &str = "\
Time,temperature_2m,relativehumidity_2m,dewpoint_2m,windspeed_10m,windspeed_100m,winddirection_10m,winddirection_100m,windgusts_10m,Power
2017-01-02 00:00:00,28.5,85,24.5,1.44,1.26,146,162,1.4,0.1635
2017-01-02 01:00:00,28.4,86,24.7,2.06,3.99,151,158,4.4,0.1424
2017-01-02 02:00:00,26.8,91,24.5,1.3,2.78,58,59,3.2,0.1214
";

    const SHORT: &str = "\
time,temperature,humidity,dewpoint,windspeed_10m,windspeed_100m,winddirection_10m,winddirection_100m,windgusts,power
2023-01-01T01:00,20.5,65.2,12.0,5.2,7.0,180,190,6.0,0.4
2023-01-01T00:00,21.2,70.5,13.0,6.8,8.0,170,185,7.0,0.3
";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_location_export() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Location2.csv", EXPORT);

        let location = Location::try_from(2).unwrap();
        let (table, summary) = DataLoader::new(dir.path()).load(location).unwrap();

        assert_eq!(table.location(), Some(location));
        assert_eq!(summary.rows, 3);
        assert_eq!(
            summary.time_range.map(|(a, b)| (a.to_string(), b.to_string())),
            Some(("2017-01-02 00:00:00".to_string(), "2017-01-02 02:00:00".to_string()))
        );
        assert_eq!(table.records()[1].wind_gusts, 4.4);
        assert_eq!(table.records()[2].power, 0.1214);
    }

    #[test]
    fn test_short_headers_and_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "short.csv", SHORT);

        let table = DataLoader::load_path(&path, None).unwrap();
        assert_eq!(table.records()[0].power, 0.3);
        assert_eq!(table.records()[1].temperature, 20.5);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::try_from(4).unwrap();
        let err = DataLoader::new(dir.path()).load(location).unwrap_err();
        assert!(format!("{:#}", err).contains("Location4.csv"));
    }

    #[test]
    fn test_duplicate_timestamps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let duplicated = format!("{}{}", EXPORT, EXPORT.lines().nth(1).unwrap());
        let path = write(dir.path(), "dup.csv", &duplicated);
        assert!(DataLoader::load_path(&path, None).is_err());
    }

    #[rstest]
    #[case("2017-01-02 00:00:00")]
    #[case("2017-01-02T00:00:00")]
    #[case("2017-01-02 00:00")]
    #[case(" 2017-01-02T00:00 ")]
    fn test_parse_time_formats(#[case] input: &str) {
        assert_eq!(parse_time(input).unwrap().to_string(), "2017-01-02 00:00:00");
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("yesterday").is_err());
    }
}
