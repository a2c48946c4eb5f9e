//! Presentation of evaluation results: the per-model metric report and the
//! actual-vs-predicted comparison window.

use anyhow::Context;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::metrics::ForecastMetrics;
use crate::error::{PipelineError, Result};
use crate::ml::PredictionSet;

/// Metrics accumulated per model name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricReport {
    models: BTreeMap<String, ForecastMetrics>,
}

impl MetricReport {
    /// Record metrics for a model, returning the record it replaced
    pub fn upsert(&mut self, model_name: &str, metrics: ForecastMetrics) -> Option<ForecastMetrics> {
        self.models.insert(model_name.to_string(), metrics)
    }

    pub fn get(&self, model_name: &str) -> Option<&ForecastMetrics> {
        self.models.get(model_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ForecastMetrics)> {
        self.models.iter().map(|(name, m)| (name.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model with the lowest RMSE
    pub fn best_by_rmse(&self) -> Option<(&str, &ForecastMetrics)> {
        self.iter()
            .min_by(|(_, a), (_, b)| a.rmse.total_cmp(&b.rmse))
    }

    /// Render all models, or just `model_name` when given
    pub fn render(&self, model_name: Option<&str>) -> String {
        let mut out = String::new();
        match model_name {
            Some(name) => match self.get(name) {
                Some(metrics) => render_block(&mut out, name, metrics),
                None => {
                    let _ = writeln!(out, "No metrics recorded for '{}'", name);
                }
            },
            None => {
                let _ = writeln!(out, "=== Model Evaluation Metrics ===");
                for (name, metrics) in self.iter() {
                    render_block(&mut out, name, metrics);
                }
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn render_block(out: &mut String, name: &str, metrics: &ForecastMetrics) {
    let _ = writeln!(out, "\n{} Model Metrics:", name.to_uppercase());
    let _ = writeln!(out, "  MAE:  {:.4}", metrics.mae);
    let _ = writeln!(out, "  RMSE: {:.4}", metrics.rmse);
    let _ = writeln!(out, "  R²:   {:.4}", metrics.r2);
    let _ = writeln!(out, "  MAPE: {:.2}%", metrics.mape);
    let _ = writeln!(out, "  n:    {}", metrics.sample_count);
}

/// The last points of a test series with every model's predictions aligned by time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonWindow {
    pub times: Vec<NaiveDateTime>,
    pub actual: Vec<f64>,
    pub predicted: BTreeMap<String, Vec<f64>>,
}

/// Slice the trailing `window_size` points; a window larger than the series is clamped.
pub fn comparison_window(
    times: &[NaiveDateTime],
    y_true: &[f64],
    predictions: &PredictionSet,
    window_size: usize,
) -> Result<ComparisonWindow> {
    let n = times.len();
    if y_true.len() != n {
        return Err(PipelineError::Shape {
            context: "comparison actuals",
            expected: n,
            found: y_true.len(),
        });
    }
    if let Some((_, series)) = predictions.iter().find(|(_, s)| s.len() != n) {
        return Err(PipelineError::Shape {
            context: "comparison predictions",
            expected: n,
            found: series.len(),
        });
    }

    let start = n - window_size.min(n);
    Ok(ComparisonWindow {
        times: times[start..].to_vec(),
        actual: y_true[start..].to_vec(),
        predicted: predictions
            .iter()
            .map(|(name, series)| (name.to_string(), series[start..].to_vec()))
            .collect(),
    })
}

impl ComparisonWindow {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Fixed-width text table, one row per time step
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{:<20} {:>10}", "time", "actual");
        for name in self.predicted.keys() {
            let _ = write!(out, " {:>12}", name);
        }
        out.push('\n');

        for (i, (time, actual)) in self.times.iter().zip(&self.actual).enumerate() {
            let _ = write!(out, "{:<20} {:>10.4}", time.format("%Y-%m-%d %H:%M").to_string(), actual);
            for series in self.predicted.values() {
                let _ = write!(out, " {:>12.4}", series[i]);
            }
            out.push('\n');
        }
        out
    }

    /// Export as CSV (`time,actual,<model>...`) for external charting
    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating comparison file {}", path.display()))?;

        let mut header = vec!["time".to_string(), "actual".to_string()];
        header.extend(self.predicted.keys().cloned());
        writer.write_record(&header)?;

        for (i, (time, actual)) in self.times.iter().zip(&self.actual).enumerate() {
            let mut row = vec![time.format("%Y-%m-%d %H:%M:%S").to_string(), actual.to_string()];
            row.extend(self.predicted.values().map(|s| s[i].to_string()));
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}
