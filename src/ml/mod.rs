//! Machine Learning Module
//!
//! Regression models for one-step-ahead power forecasting:
//! - Gradient descent linear regression (always available)
//! - SmartCore OLS, ridge, decision tree and random forest (`ml` feature)
//!
//! # Architecture
//! - Training pipeline: one independent task per configured model
//! - Inference: batch prediction on a scaled test set and single-sample
//!   prediction from operator-supplied parameters
//! - Trained models live only for the current run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::forecast::features::FeatureSchema;
use crate::forecast::metrics::ForecastMetrics;

pub mod inference;
pub mod models;
pub mod training;

#[cfg(feature = "ml")]
pub mod smartcore;

pub use inference::{PredictionSet, Predictor};
pub use models::{LinearRegressionModel, MLModel};
pub use training::{
    AlgorithmConfig, ModelConfig, ModelFitFailure, ModelTrainer, TrainedModels, TrainingConfig,
    TrainingDataset,
};

/// Regression algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    LinearGd,
    Linear,
    Ridge,
    DecisionTree,
    RandomForest,
}

impl Algorithm {
    /// Whether this build can train the algorithm
    pub fn is_available(&self) -> bool {
        match self {
            Algorithm::LinearGd => true,
            _ => cfg!(feature = "ml"),
        }
    }
}

/// ML Model Metadata
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub name: String,
    pub algorithm: Algorithm,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    /// In-sample fit quality
    pub training_metrics: ForecastMetrics,
    /// Column order the model was fitted on
    pub schema: FeatureSchema,
}
