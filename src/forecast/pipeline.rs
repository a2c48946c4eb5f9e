//! End-to-end forecasting run
//!
//! build examples → chronological split → fit scaler on train → train models
//! → predict test → score every model, persistence included, on the same
//! test targets.

use chrono::{Duration, NaiveDateTime};
use tracing::info;

use super::features::{build_one_hour_ahead_table, chronological_split, FeatureSchema};
use super::metrics::evaluate;
use super::persistence::PersistenceBaseline;
use super::report::{comparison_window, ComparisonWindow, MetricReport};
use super::scaler::{StandardScaler, ZeroVariancePolicy};
use crate::domain::MeasurementTable;
use crate::error::{PipelineError, Result};
use crate::ml::{ModelFitFailure, ModelTrainer, PredictionSet, Predictor, TrainingConfig, TrainingDataset};

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub test_fraction: f64,
    /// Largest gap between a feature row and its target row
    pub sampling_interval: Duration,
    pub include_current_power: bool,
    pub zero_variance: ZeroVariancePolicy,
    pub training: TrainingConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            sampling_interval: Duration::hours(1),
            include_current_power: false,
            zero_variance: ZeroVariancePolicy::default(),
            training: TrainingConfig::default(),
        }
    }
}

/// Everything a run produced
pub struct PipelineRun {
    /// Trained models plus the training scaler, ready for single-sample prediction
    pub predictor: Predictor,
    pub report: MetricReport,
    /// Test-set predictions per model, persistence included
    pub predictions: PredictionSet,
    /// Target time of each test example
    pub test_times: Vec<NaiveDateTime>,
    pub test_targets: Vec<f64>,
    pub train_size: usize,
    pub failures: Vec<ModelFitFailure>,
}

impl PipelineRun {
    pub fn comparison(&self, window_size: usize) -> Result<ComparisonWindow> {
        comparison_window(&self.test_times, &self.test_targets, &self.predictions, window_size)
    }
}

pub struct ForecastPipeline {
    options: PipelineOptions,
}

impl ForecastPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::for_forecast(self.options.include_current_power)
    }

    pub fn run(&self, table: &MeasurementTable) -> Result<PipelineRun> {
        let schema = self.schema();
        info!(rows = table.len(), features = %schema, "preprocessing data");

        let examples = build_one_hour_ahead_table(table, &schema, self.options.sampling_interval)?;
        let (train, test) = chronological_split(examples, self.options.test_fraction)?;
        info!(train = train.len(), test = test.len(), "chronological split");

        let train_set = TrainingDataset::from_examples(&train);
        let test_set = TrainingDataset::from_examples(&test);
        let test_times: Vec<NaiveDateTime> = test.iter().map(|e| e.target_time).collect();

        let scaler = StandardScaler::new(self.options.zero_variance).fit(&train_set.features)?;
        let train_scaled = TrainingDataset::new(
            scaler.transform_batch(&train_set.features)?,
            train_set.targets,
        )?;
        let test_scaled = scaler.transform_batch(&test_set.features)?;

        let mut report = MetricReport::default();

        info!("evaluating persistence baseline");
        let persistence = PersistenceBaseline.series(table)?;
        report = evaluate(report, &persistence.y_true, &persistence.y_pred, PersistenceBaseline::NAME)?;

        info!("training models");
        let trained = ModelTrainer::new(self.options.training.clone()).train_all(&train_scaled)?;
        if trained.is_empty() {
            return Err(PipelineError::Data(format!(
                "no model could be trained ({} failed)",
                trained.failures.len()
            )));
        }

        let mut predictor = Predictor::new(trained.models);
        predictor.set_scaler(scaler, &schema)?;

        info!("evaluating models on test set");
        let mut predictions = predictor.predict_with_models(&test_scaled)?;
        predictions.insert(PersistenceBaseline::NAME, persistence.aligned_to(&test_times)?);

        for (name, series) in predictions.iter() {
            report = evaluate(report, &test_set.targets, series, name)?;
        }

        if let Some((best, metrics)) = report.best_by_rmse() {
            info!(model = best, rmse = metrics.rmse, "best model on test set");
        }

        Ok(PipelineRun {
            predictor,
            report,
            predictions,
            test_times,
            test_targets: test_set.targets,
            train_size: train.len(),
            failures: trained.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{hour, record};
    use crate::domain::MeasurementTable;
    use crate::ml::{AlgorithmConfig, ModelConfig};

    fn table(n: i64) -> MeasurementTable {
        let records = (0..n)
            .map(|h| {
                let seed = h as f64 * 0.3;
                record(hour(h), seed, 0.5 + 0.4 * (seed * 0.7).sin())
            })
            .collect();
        MeasurementTable::new(None, records).unwrap()
    }

    fn options(models: Vec<ModelConfig>) -> PipelineOptions {
        PipelineOptions {
            training: TrainingConfig {
                models,
                parallel: false,
            },
            ..PipelineOptions::default()
        }
    }

    fn gd(name: &str, learning_rate: f64) -> ModelConfig {
        ModelConfig::new(
            name,
            AlgorithmConfig::LinearGd {
                learning_rate,
                max_iterations: 300,
            },
        )
    }

    #[test]
    fn test_run_scores_every_model_on_test_set() {
        let run = ForecastPipeline::new(options(vec![gd("linear_gd", 0.05)]))
            .run(&table(100))
            .unwrap();

        assert_eq!(run.test_targets.len(), 20);
        assert_eq!(run.train_size, 79);
        assert_eq!(run.report.len(), 2);
        for (_, metrics) in run.report.iter() {
            assert_eq!(metrics.sample_count, 20);
        }
    }

    #[test]
    fn test_persistence_aligned_with_test_targets() {
        let data = table(50);
        let run = ForecastPipeline::new(options(vec![gd("linear_gd", 0.05)]))
            .run(&data)
            .unwrap();

        let persistence = run.predictions.get("persistence").unwrap();
        for (i, time) in run.test_times.iter().enumerate() {
            let idx = data.records().iter().position(|r| r.time == *time).unwrap();
            assert_eq!(persistence[i], data.records()[idx - 1].power);
            assert_eq!(run.test_targets[i], data.records()[idx].power);
        }
    }

    #[test]
    fn test_failed_model_is_reported_not_fatal() {
        let run = ForecastPipeline::new(options(vec![gd("ok", 0.05), gd("diverges", 1e6)]))
            .run(&table(60))
            .unwrap();

        assert_eq!(run.failures.len(), 1);
        assert!(run.report.get("ok").is_some());
        assert!(run.report.get("diverges").is_none());
    }

    #[test]
    fn test_all_models_failing_is_an_error() {
        let result = ForecastPipeline::new(options(vec![gd("diverges", 1e6)])).run(&table(60));
        assert!(matches!(result, Err(PipelineError::Data(_))));
    }

    #[test]
    fn test_comparison_window_from_run() {
        let run = ForecastPipeline::new(options(vec![gd("linear_gd", 0.05)]))
            .run(&table(40))
            .unwrap();
        let window = run.comparison(5).unwrap();
        assert_eq!(window.len(), 5);
        assert_eq!(window.times.last(), run.test_times.last());
        assert!(window.predicted.contains_key("persistence"));
    }
}
