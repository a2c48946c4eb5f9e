//! Forecast Metrics and Evaluation
//!
//! This module provides the error metrics used to score every forecaster on
//! common footing (MAE, RMSE, R², MAPE) and the evaluation entry point that
//! records them into a [`MetricReport`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::report::MetricReport;
use crate::error::{PipelineError, Result};

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Mean Absolute Percentage Error (%), over non-zero actuals only
    pub mape: f64,
    /// Maximum absolute error observed
    pub max_error: f64,
    /// Number of samples evaluated
    pub sample_count: usize,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PipelineError::Shape {
                context: "evaluation",
                expected: actual.len(),
                found: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(PipelineError::Data("no samples to evaluate".to_string()));
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n).sqrt();

        let percentage_errors: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > 1e-6)
            .map(|(a, e)| (e / a).abs() * 100.0)
            .collect();
        let mape = if percentage_errors.is_empty() {
            0.0
        } else {
            percentage_errors.iter().sum::<f64>() / percentage_errors.len() as f64
        };

        let mean_actual = actual.iter().sum::<f64>() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();

        // Constant actuals: only an exact fit explains them
        let r2 = if total_variance > 1e-12 {
            1.0 - sse / total_variance
        } else if sse <= 1e-12 {
            1.0
        } else {
            0.0
        };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        Ok(ForecastMetrics {
            mae,
            rmse,
            r2,
            mape,
            max_error,
            sample_count: actual.len(),
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.4}, RMSE={:.4}, R²={:.4}, MAPE={:.2}%, n={}",
            self.mae, self.rmse, self.r2, self.mape, self.sample_count
        )
    }
}

/// Score one model and record the result, replacing any earlier record for `model_name`.
///
/// The accumulator is passed in and handed back so that no report state lives
/// outside the caller.
pub fn evaluate(
    mut report: MetricReport,
    y_true: &[f64],
    y_pred: &[f64],
    model_name: &str,
) -> Result<MetricReport> {
    let metrics = ForecastMetrics::calculate(y_true, y_pred)?;
    tracing::debug!(model = model_name, %metrics, "evaluated model");
    report.upsert(model_name, metrics);
    Ok(report)
}
