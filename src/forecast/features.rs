//! Feature engineering for one-hour-ahead forecasting
//!
//! This module turns a measurement table into supervised examples
//! (features at time t, target = power at the next sample) and owns the
//! named feature schema shared by the scaler, the trained models and the
//! single-sample prediction path.

use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::domain::{MeasurementRecord, MeasurementTable};
use crate::error::{PipelineError, Result};

/// Named model input
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    IntoStaticStr, Serialize,
)]
#[serde(into = "&'static str")]
pub enum Feature {
    #[strum(serialize = "temperature")]
    Temperature,
    #[strum(serialize = "humidity")]
    Humidity,
    #[strum(serialize = "dewpoint")]
    Dewpoint,
    #[strum(serialize = "windspeed_10m")]
    WindSpeed10m,
    #[strum(serialize = "windspeed_100m")]
    WindSpeed100m,
    #[strum(serialize = "winddirection_10m")]
    WindDirection10m,
    #[strum(serialize = "winddirection_100m")]
    WindDirection100m,
    #[strum(serialize = "windgusts")]
    WindGusts,
    /// Power observed at the feature row's own time (lag of the target)
    #[strum(serialize = "current_power")]
    CurrentPower,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// The features observable from a single weather snapshot
    pub fn weather() -> impl Iterator<Item = Feature> {
        Feature::iter().filter(|f| *f != Feature::CurrentPower)
    }

    pub fn value_of(&self, record: &MeasurementRecord) -> f64 {
        match self {
            Feature::Temperature => record.temperature,
            Feature::Humidity => record.humidity,
            Feature::Dewpoint => record.dewpoint,
            Feature::WindSpeed10m => record.wind_speed_10m,
            Feature::WindSpeed100m => record.wind_speed_100m,
            Feature::WindDirection10m => record.wind_direction_10m,
            Feature::WindDirection100m => record.wind_direction_100m,
            Feature::WindGusts => record.wind_gusts,
            Feature::CurrentPower => record.power,
        }
    }

    /// Operator-facing label used when prompting for the value
    pub fn label(&self) -> &'static str {
        match self {
            Feature::Temperature => "Temperature at 2m (°C)",
            Feature::Humidity => "Relative Humidity at 2m (%)",
            Feature::Dewpoint => "Dewpoint at 2m (°C)",
            Feature::WindSpeed10m => "Wind Speed at 10m (m/s)",
            Feature::WindSpeed100m => "Wind Speed at 100m (m/s)",
            Feature::WindDirection10m => "Wind Direction at 10m (degrees)",
            Feature::WindDirection100m => "Wind Direction at 100m (degrees)",
            Feature::WindGusts => "Wind Gusts at 10m (m/s)",
            Feature::CurrentPower => "Current Power",
        }
    }
}

/// Ordered, duplicate-free set of feature names.
///
/// Cloning shares the underlying list; a schema never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema(Arc<[Feature]>);

impl FeatureSchema {
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Result<Self> {
        let features: Vec<Feature> = features.into_iter().collect();
        if features.is_empty() {
            return Err(PipelineError::Config("feature schema is empty".to_string()));
        }
        if let Some(dup) = features.iter().duplicates().next() {
            return Err(PipelineError::Config(format!(
                "feature '{}' appears more than once in the schema",
                dup
            )));
        }
        Ok(Self(features.into()))
    }

    /// The eight weather fields, optionally followed by the current-power lag feature
    pub fn for_forecast(include_current_power: bool) -> Self {
        let features: Vec<Feature> = if include_current_power {
            Feature::weather().chain([Feature::CurrentPower]).collect()
        } else {
            Feature::weather().collect()
        };
        Self(features.into())
    }

    pub fn features(&self) -> &[Feature] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn position(&self, feature: Feature) -> Option<usize> {
        self.0.iter().position(|f| *f == feature)
    }

    /// True when both schemas name the same features, in any order
    pub fn same_features(&self, other: &FeatureSchema) -> bool {
        self.len() == other.len() && self.0.iter().all(|f| other.position(*f).is_some())
    }

    pub fn extract(&self, record: &MeasurementRecord) -> FeatureVector {
        FeatureVector {
            schema: self.clone(),
            values: self.0.iter().map(|f| f.value_of(record)).collect(),
        }
    }

    /// Build a vector from named values, in schema order.
    ///
    /// Fails on the first schema feature (in order) that has no value.
    pub fn vector_from_values(&self, values: &BTreeMap<Feature, f64>) -> Result<FeatureVector> {
        let values = self
            .0
            .iter()
            .map(|f| {
                values
                    .get(f)
                    .copied()
                    .ok_or_else(|| PipelineError::MissingFeature {
                        feature: f.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureVector {
            schema: self.clone(),
            values,
        })
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(", "))
    }
}

/// Feature values tagged with the schema that orders them
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(schema: FeatureSchema, values: Vec<f64>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(PipelineError::Shape {
                context: "feature vector",
                expected: schema.len(),
                found: values.len(),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.schema.position(feature).map(|i| self.values[i])
    }

    /// Re-map the values onto `target`'s order by feature name
    pub fn aligned_to(&self, target: &FeatureSchema) -> Result<FeatureVector> {
        if &self.schema == target {
            return Ok(self.clone());
        }
        let mismatch = || PipelineError::schema(target.features(), self.schema.features());
        if !self.schema.same_features(target) {
            return Err(mismatch());
        }

        let values = target
            .features()
            .iter()
            .map(|f| self.get(*f))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(mismatch)?;

        Ok(FeatureVector {
            schema: target.clone(),
            values,
        })
    }
}

/// Features at `time` paired with the power observed at `target_time`
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedExample {
    pub time: NaiveDateTime,
    pub target_time: NaiveDateTime,
    pub features: FeatureVector,
    pub target: f64,
}

/// Build the one-step-ahead supervised table.
///
/// A record contributes an example only when its successor follows within
/// `interval`; records before a gap (and the final record) are dropped.
pub fn build_one_hour_ahead_table(
    table: &MeasurementTable,
    schema: &FeatureSchema,
    interval: Duration,
) -> Result<Vec<SupervisedExample>> {
    let examples: Vec<SupervisedExample> = table
        .records()
        .iter()
        .tuple_windows()
        .filter(|(current, next)| next.time - current.time <= interval)
        .map(|(current, next)| SupervisedExample {
            time: current.time,
            target_time: next.time,
            features: schema.extract(current),
            target: next.power,
        })
        .collect();

    if examples.is_empty() {
        return Err(PipelineError::Data(format!(
            "no record in a table of {} has a successor within {} minutes",
            table.len(),
            interval.num_minutes()
        )));
    }

    debug!(
        records = table.len(),
        examples = examples.len(),
        dropped = table.len() - examples.len(),
        "built one-step-ahead table"
    );

    Ok(examples)
}

/// Split examples by time: the last `test_fraction` become the test set.
pub fn chronological_split(
    examples: Vec<SupervisedExample>,
    test_fraction: f64,
) -> Result<(Vec<SupervisedExample>, Vec<SupervisedExample>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Config(format!(
            "test fraction must lie strictly between 0 and 1, got {}",
            test_fraction
        )));
    }

    let n = examples.len();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::Data(format!(
            "cannot split {} examples with test fraction {}",
            n, test_fraction
        )));
    }

    let mut train = examples;
    let test = train.split_off(n - n_test);
    Ok((train, test))
}

/// Persistence forecast over a whole table: the next value equals the current one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceSeries {
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
    /// Time of each `y_true` observation
    pub times: Vec<NaiveDateTime>,
}

impl PersistenceSeries {
    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    /// Persistence predictions for the given target times, in the same order
    pub fn aligned_to(&self, target_times: &[NaiveDateTime]) -> Result<Vec<f64>> {
        let by_time: BTreeMap<NaiveDateTime, f64> = self
            .times
            .iter()
            .copied()
            .zip(self.y_pred.iter().copied())
            .collect();

        target_times
            .iter()
            .map(|t| {
                by_time.get(t).copied().ok_or(PipelineError::Shape {
                    context: "persistence alignment",
                    expected: target_times.len(),
                    found: self.len(),
                })
            })
            .collect()
    }
}

pub fn persistence_series(table: &MeasurementTable) -> Result<PersistenceSeries> {
    if table.len() < 2 {
        return Err(PipelineError::Data(
            "persistence needs at least two records".to_string(),
        ));
    }

    let (y_pred, (y_true, times)): (Vec<f64>, (Vec<f64>, Vec<NaiveDateTime>)) = table
        .records()
        .iter()
        .tuple_windows()
        .map(|(current, next)| (current.power, (next.power, next.time)))
        .unzip();

    Ok(PersistenceSeries {
        y_true,
        y_pred,
        times,
    })
}

/// Range and mean of one weather column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStats {
    pub feature: Feature,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl fmt::Display for FeatureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {}: range [{:.2} to {:.2}], mean: {:.2}",
            self.feature, self.min, self.max, self.mean
        )
    }
}

/// Per-column statistics of the weather fields (time and power excluded)
pub fn feature_overview(table: &MeasurementTable) -> Vec<FeatureStats> {
    let n = table.len().max(1) as f64;
    Feature::weather()
        .map(|feature| {
            let values = table.records().iter().map(|r| feature.value_of(r));
            let (min, max) = values
                .clone()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            FeatureStats {
                feature,
                min,
                max,
                mean: values.sum::<f64>() / n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{hour, hourly_table, record};
    use proptest::prelude::*;
    use std::str::FromStr;

    fn weather_schema() -> FeatureSchema {
        FeatureSchema::for_forecast(false)
    }

    #[test]
    fn test_feature_names_round_trip() {
        for feature in Feature::iter() {
            assert_eq!(Feature::from_str(feature.name()).unwrap(), feature);
        }
        assert_eq!(Feature::WindGusts.to_string(), "windgusts");
        assert!(Feature::from_str("wind_gusts").is_err());
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let result = FeatureSchema::new([Feature::Humidity, Feature::Humidity]);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_schema_for_forecast() {
        assert_eq!(weather_schema().len(), 8);
        let with_power = FeatureSchema::for_forecast(true);
        assert_eq!(with_power.len(), 9);
        assert_eq!(with_power.position(Feature::CurrentPower), Some(8));
    }

    #[test]
    fn test_one_hour_ahead_targets_are_next_power() {
        let table = hourly_table(&[10.0, 12.0, 11.0, 15.0]);
        let examples =
            build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1)).unwrap();

        assert_eq!(examples.len(), 3);
        assert_eq!(
            examples.iter().map(|e| e.target).collect::<Vec<_>>(),
            vec![12.0, 11.0, 15.0]
        );
        for (example, record) in examples.iter().zip(table.records()) {
            assert_eq!(example.time, record.time);
            assert_eq!(example.features.get(Feature::Temperature), Some(record.temperature));
        }
    }

    #[test]
    fn test_one_hour_ahead_drops_gaps() {
        let records = vec![
            record(hour(0), 0.0, 1.0),
            record(hour(1), 1.0, 2.0),
            record(hour(5), 2.0, 3.0),
            record(hour(6), 3.0, 4.0),
        ];
        let table = MeasurementTable::new(None, records).unwrap();
        let examples =
            build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1)).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].time, hour(0));
        assert_eq!(examples[1].time, hour(5));
        assert_eq!(examples[1].target, 4.0);
    }

    #[test]
    fn test_one_hour_ahead_all_dropped_is_error() {
        let records = vec![record(hour(0), 0.0, 1.0), record(hour(3), 1.0, 2.0)];
        let table = MeasurementTable::new(None, records).unwrap();
        let result = build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1));
        assert!(matches!(result, Err(PipelineError::Data(_))));
    }

    #[test]
    fn test_current_power_lag_feature() {
        let table = hourly_table(&[10.0, 12.0, 11.0]);
        let schema = FeatureSchema::for_forecast(true);
        let examples = build_one_hour_ahead_table(&table, &schema, Duration::hours(1)).unwrap();
        assert_eq!(examples[0].features.get(Feature::CurrentPower), Some(10.0));
        assert_eq!(examples[0].target, 12.0);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let table = hourly_table(&[1.0, 2.0, 3.0, 4.0]);
        for fraction in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let examples =
                build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1)).unwrap();
            assert!(matches!(
                chronological_split(examples, fraction),
                Err(PipelineError::Config(_))
            ));
        }
    }

    #[test]
    fn test_split_sizes() {
        let powers: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let table = hourly_table(&powers);
        let examples =
            build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1)).unwrap();
        let (train, test) = chronological_split(examples, 0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn test_persistence_scenario() {
        let table = hourly_table(&[10.0, 12.0, 11.0, 15.0, 14.0, 13.0]);
        let series = persistence_series(&table).unwrap();

        assert_eq!(series.len(), table.len() - 1);
        assert_eq!(series.y_pred, vec![10.0, 12.0, 11.0, 15.0, 14.0]);
        assert_eq!(series.y_true, vec![12.0, 11.0, 15.0, 14.0, 13.0]);
        assert_eq!(series.times[0], hour(1));
        for (i, pred) in series.y_pred.iter().enumerate() {
            assert_eq!(*pred, table.records()[i].power);
        }
    }

    #[test]
    fn test_persistence_alignment() {
        let table = hourly_table(&[10.0, 12.0, 11.0, 15.0]);
        let series = persistence_series(&table).unwrap();
        assert_eq!(series.aligned_to(&[hour(3), hour(2)]).unwrap(), vec![11.0, 12.0]);
        assert!(series.aligned_to(&[hour(9)]).is_err());
    }

    #[test]
    fn test_persistence_needs_two_records() {
        let table = hourly_table(&[10.0]);
        assert!(persistence_series(&table).is_err());
    }

    #[test]
    fn test_vector_from_values_names_missing_feature() {
        let schema = weather_schema();
        let mut values: BTreeMap<Feature, f64> = Feature::weather().map(|f| (f, 1.0)).collect();
        values.remove(&Feature::Dewpoint);

        match schema.vector_from_values(&values) {
            Err(PipelineError::MissingFeature { feature }) => assert_eq!(feature, "dewpoint"),
            other => panic!("expected missing feature, got {:?}", other),
        }
    }

    #[test]
    fn test_aligned_to_remaps_by_name() {
        let a = FeatureSchema::new([Feature::Humidity, Feature::Temperature]).unwrap();
        let b = FeatureSchema::new([Feature::Temperature, Feature::Humidity]).unwrap();
        let v = FeatureVector::new(a, vec![70.0, 20.0]).unwrap();

        let aligned = v.aligned_to(&b).unwrap();
        assert_eq!(aligned.values(), &[20.0, 70.0]);

        let c = FeatureSchema::new([Feature::Temperature, Feature::Dewpoint]).unwrap();
        assert!(matches!(v.aligned_to(&c), Err(PipelineError::Schema { .. })));
    }

    #[test]
    fn test_aligned_to_never_substitutes_a_column() {
        let a = FeatureSchema::new([Feature::Humidity, Feature::Temperature]).unwrap();
        let v = FeatureVector::new(a, vec![70.0, 20.0]).unwrap();

        for target in [
            vec![Feature::Dewpoint, Feature::Temperature],
            vec![Feature::Humidity],
            vec![Feature::Temperature, Feature::Humidity, Feature::Dewpoint],
        ] {
            let schema = FeatureSchema::new(target).unwrap();
            match v.aligned_to(&schema) {
                Err(PipelineError::Schema { .. }) => {}
                other => panic!("expected a schema error for {:?}, got {:?}", schema, other),
            }
        }
    }

    #[test]
    fn test_feature_overview_format() {
        let records = [20.5, 21.2, 19.8, 22.5, 23.1]
            .iter()
            .enumerate()
            .map(|(i, t)| MeasurementRecord {
                temperature: *t,
                ..record(hour(i as i64), 0.0, 100.0)
            })
            .collect();
        let table = MeasurementTable::new(None, records).unwrap();
        let overview = feature_overview(&table);

        assert_eq!(overview.len(), 8);
        assert_eq!(
            overview[0].to_string(),
            "- temperature: range [19.80 to 23.10], mean: 21.42"
        );
        assert!(overview.iter().all(|s| s.feature != Feature::CurrentPower));
    }

    proptest! {
        #[test]
        fn prop_split_is_chronological(n in 2usize..80, fraction in 0.01f64..0.99) {
            let powers: Vec<f64> = (0..=n).map(|i| i as f64).collect();
            let table = hourly_table(&powers);
            let examples =
                build_one_hour_ahead_table(&table, &weather_schema(), Duration::hours(1)).unwrap();
            if let Ok((train, test)) = chronological_split(examples, fraction) {
                prop_assert_eq!(train.len() + test.len(), n);
                let last_train = train.iter().map(|e| e.time).max().unwrap();
                let first_test = test.iter().map(|e| e.time).min().unwrap();
                prop_assert!(last_train < first_test);
                prop_assert!(train.iter().all(|e| e.target_time <= first_test));
            }
        }
    }
}
