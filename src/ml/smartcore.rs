//! SmartCore Regressor Wrapper
//!
//! Wraps SmartCore's OLS, ridge, decision tree and random forest regressors
//! behind [`MLModel`], converting feature rows to a row-major `DenseMatrix`.

use ::smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use ::smartcore::error::Failed;
use ::smartcore::linalg::basic::matrix::DenseMatrix;
use ::smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use ::smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use ::smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::models::{check_schema, fitted_metadata, MLModel};
use super::training::AlgorithmConfig;
use super::{Algorithm, ModelMetadata};
use crate::error::{PipelineError, Result};
use crate::forecast::features::FeatureVector;

type Matrix = DenseMatrix<f64>;

enum Fitted {
    Linear(LinearRegression<f64, f64, Matrix, Vec<f64>>),
    Ridge(RidgeRegression<f64, f64, Matrix, Vec<f64>>),
    DecisionTree(DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>),
    RandomForest(RandomForestRegressor<f64, f64, Matrix, Vec<f64>>),
}

impl Fitted {
    fn predict(&self, x: &Matrix) -> std::result::Result<Vec<f64>, Failed> {
        match self {
            Fitted::Linear(model) => model.predict(x),
            Fitted::Ridge(model) => model.predict(x),
            Fitted::DecisionTree(model) => model.predict(x),
            Fitted::RandomForest(model) => model.predict(x),
        }
    }
}

/// A fitted SmartCore regressor
pub struct SmartcoreRegressor {
    metadata: ModelMetadata,
    fitted: Fitted,
}

impl SmartcoreRegressor {
    /// Fit the configured SmartCore algorithm on (already scaled) features
    pub fn train(
        name: &str,
        config: &AlgorithmConfig,
        features: &[FeatureVector],
        targets: &[f64],
    ) -> Result<Self> {
        let schema = features
            .first()
            .map(|f| f.schema().clone())
            .ok_or_else(|| PipelineError::model_fit(name, "cannot train on empty dataset"))?;
        if matches!(config, AlgorithmConfig::Linear) && features.len() <= schema.len() {
            return Err(PipelineError::model_fit(
                name,
                format!(
                    "least squares needs more rows than features, got {} rows for {} features",
                    features.len(),
                    schema.len()
                ),
            ));
        }

        let x = to_matrix(features);
        let y = targets.to_vec();
        let fit_error = |e: Failed| PipelineError::model_fit(name, e);

        let (algorithm, fitted) = match config {
            AlgorithmConfig::Linear => (
                Algorithm::Linear,
                Fitted::Linear(
                    LinearRegression::fit(&x, &y, LinearRegressionParameters::default())
                        .map_err(fit_error)?,
                ),
            ),
            AlgorithmConfig::Ridge { alpha } => (
                Algorithm::Ridge,
                Fitted::Ridge(
                    RidgeRegression::fit(
                        &x,
                        &y,
                        RidgeRegressionParameters::default().with_alpha(*alpha),
                    )
                    .map_err(fit_error)?,
                ),
            ),
            AlgorithmConfig::DecisionTree {
                max_depth,
                min_samples_split,
                min_samples_leaf,
            } => {
                let mut params = DecisionTreeRegressorParameters::default()
                    .with_min_samples_split(*min_samples_split)
                    .with_min_samples_leaf(*min_samples_leaf);
                if let Some(depth) = max_depth {
                    params = params.with_max_depth(*depth);
                }
                (
                    Algorithm::DecisionTree,
                    Fitted::DecisionTree(
                        DecisionTreeRegressor::fit(&x, &y, params).map_err(fit_error)?,
                    ),
                )
            }
            AlgorithmConfig::RandomForest {
                n_trees,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                seed,
            } => {
                let params = RandomForestRegressorParameters {
                    max_depth: *max_depth,
                    min_samples_leaf: *min_samples_leaf,
                    min_samples_split: *min_samples_split,
                    n_trees: *n_trees,
                    m: None, // sqrt(n_features)
                    keep_samples: false,
                    seed: *seed,
                };
                (
                    Algorithm::RandomForest,
                    Fitted::RandomForest(
                        RandomForestRegressor::fit(&x, &y, params).map_err(fit_error)?,
                    ),
                )
            }
            AlgorithmConfig::LinearGd { .. } => {
                return Err(PipelineError::model_fit(
                    name,
                    "gradient descent is not a SmartCore algorithm",
                ))
            }
        };

        let predictions = fitted.predict(&x).map_err(fit_error)?;
        let metadata = fitted_metadata(name, algorithm, schema, &predictions, targets)?;

        Ok(Self { metadata, fitted })
    }
}

impl MLModel for SmartcoreRegressor {
    fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        check_schema(&self.metadata.schema, rows)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let predictions = self
            .fitted
            .predict(&to_matrix(rows))
            .map_err(|e| PipelineError::Data(format!("{} prediction failed: {}", self.metadata.name, e)))?;

        if predictions.len() != rows.len() {
            return Err(PipelineError::Shape {
                context: "model predictions",
                expected: rows.len(),
                found: predictions.len(),
            });
        }
        Ok(predictions)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

fn to_matrix(rows: &[FeatureVector]) -> Matrix {
    let n_features = rows.first().map(|r| r.len()).unwrap_or_default();
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.values().iter().copied()).collect();
    DenseMatrix::new(rows.len(), n_features, flat, false)
}
