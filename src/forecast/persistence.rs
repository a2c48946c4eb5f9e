use super::features::{persistence_series, PersistenceSeries};
use crate::domain::MeasurementTable;
use crate::error::Result;

/// Naive forecaster: the next value equals the current value. Needs no fitting.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceBaseline;

impl PersistenceBaseline {
    pub const NAME: &'static str = "persistence";

    pub fn series(&self, table: &MeasurementTable) -> Result<PersistenceSeries> {
        persistence_series(table)
    }

    pub fn predict_next(&self, current_power: f64) -> f64 {
        current_power
    }
}
