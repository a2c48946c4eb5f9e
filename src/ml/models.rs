//! ML Model Definitions
//!
//! The [`MLModel`] trait every trained regressor implements, and the
//! gradient descent linear regression that needs no external solver.

use chrono::Utc;

use super::{Algorithm, ModelMetadata};
use crate::error::{PipelineError, Result};
use crate::forecast::features::{FeatureSchema, FeatureVector};
use crate::forecast::metrics::ForecastMetrics;

/// Trait for trained regression models
pub trait MLModel: Send + Sync {
    /// Predict one value per row; rows must use the training schema
    fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    fn predict(&self, row: &FeatureVector) -> Result<f64> {
        self.predict_batch(std::slice::from_ref(row))?
            .pop()
            .ok_or_else(|| PipelineError::Data("model returned no prediction".to_string()))
    }

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn algorithm(&self) -> Algorithm {
        self.metadata().algorithm
    }
}

/// Reject rows whose schema differs from the one the model was fitted on
pub(crate) fn check_schema(schema: &FeatureSchema, rows: &[FeatureVector]) -> Result<()> {
    match rows.iter().find(|r| r.schema() != schema) {
        Some(row) => Err(PipelineError::schema(
            schema.features(),
            row.schema().features(),
        )),
        None => Ok(()),
    }
}

/// Build metadata once in-sample predictions are known, rejecting non-finite fits
pub(crate) fn fitted_metadata(
    name: &str,
    algorithm: Algorithm,
    schema: FeatureSchema,
    predictions: &[f64],
    targets: &[f64],
) -> Result<ModelMetadata> {
    if predictions.iter().any(|p| !p.is_finite()) {
        return Err(PipelineError::model_fit(
            name,
            "in-sample predictions are not finite",
        ));
    }

    Ok(ModelMetadata {
        name: name.to_string(),
        algorithm,
        trained_at: Utc::now(),
        training_samples: targets.len(),
        training_metrics: ForecastMetrics::calculate(targets, predictions)?,
        schema,
    })
}

/// Linear regression fitted by batch gradient descent
#[derive(Debug, Clone)]
pub struct LinearRegressionModel {
    pub metadata: ModelMetadata,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressionModel {
    /// Fit on (already scaled) features
    pub fn train(
        name: &str,
        features: &[FeatureVector],
        targets: &[f64],
        learning_rate: f64,
        max_iterations: usize,
    ) -> Result<Self> {
        let schema = features
            .first()
            .map(|f| f.schema().clone())
            .ok_or_else(|| PipelineError::model_fit(name, "cannot train on empty dataset"))?;

        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(PipelineError::model_fit(
                name,
                format!("learning rate must be positive, got {}", learning_rate),
            ));
        }

        let n = features.len() as f64;
        let n_features = schema.len();
        let mut coefficients = vec![0.0; n_features];
        let mut intercept = 0.0;

        for _iter in 0..max_iterations {
            let mut coef_gradients = vec![0.0; n_features];
            let mut intercept_gradient = 0.0;

            for (row, target) in features.iter().zip(targets) {
                let error = linear_combination(row.values(), &coefficients, intercept) - target;
                for (gradient, value) in coef_gradients.iter_mut().zip(row.values()) {
                    *gradient += error * value / n;
                }
                intercept_gradient += error / n;
            }

            for (coef, gradient) in coefficients.iter_mut().zip(&coef_gradients) {
                *coef -= learning_rate * gradient;
            }
            intercept -= learning_rate * intercept_gradient;

            if !intercept.is_finite() {
                return Err(PipelineError::model_fit(
                    name,
                    "gradient descent diverged; lower the learning rate",
                ));
            }
        }

        let predictions: Vec<f64> = features
            .iter()
            .map(|row| linear_combination(row.values(), &coefficients, intercept))
            .collect();
        let metadata = fitted_metadata(name, Algorithm::LinearGd, schema, &predictions, targets)?;

        Ok(Self {
            metadata,
            coefficients,
            intercept,
        })
    }
}

fn linear_combination(values: &[f64], coefficients: &[f64], intercept: f64) -> f64 {
    values
        .iter()
        .zip(coefficients)
        .map(|(v, c)| v * c)
        .sum::<f64>()
        + intercept
}

impl MLModel for LinearRegressionModel {
    fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        check_schema(&self.metadata.schema, rows)?;
        Ok(rows
            .iter()
            .map(|row| linear_combination(row.values(), &self.coefficients, self.intercept))
            .collect())
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
