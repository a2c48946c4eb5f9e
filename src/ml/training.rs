//! ML Model Training Pipeline
//!
//! Each configured model is an independent training task that fills its own
//! named result slot. A failed task is reported and left out; it never stops
//! the others.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{info, warn};
use validator::Validate;

use super::models::{LinearRegressionModel, MLModel};
use super::Algorithm;
use crate::error::{PipelineError, Result};
use crate::forecast::features::{FeatureVector, SupervisedExample};

/// Training Dataset
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub features: Vec<FeatureVector>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(features: Vec<FeatureVector>, targets: Vec<f64>) -> Result<Self> {
        if features.len() != targets.len() {
            return Err(PipelineError::Shape {
                context: "training dataset",
                expected: features.len(),
                found: targets.len(),
            });
        }
        Ok(Self { features, targets })
    }

    pub fn from_examples(examples: &[SupervisedExample]) -> Self {
        Self {
            features: examples.iter().map(|e| e.features.clone()).collect(),
            targets: examples.iter().map(|e| e.target).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Algorithm and its fitting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    LinearGd {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
    },
    Linear,
    Ridge {
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
    DecisionTree {
        #[serde(default)]
        max_depth: Option<u16>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
    },
    RandomForest {
        #[serde(default = "default_n_trees")]
        n_trees: usize,
        #[serde(default)]
        max_depth: Option<u16>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

fn default_learning_rate() -> f64 {
    0.05
}
fn default_max_iterations() -> usize {
    2000
}
fn default_alpha() -> f64 {
    1.0
}
fn default_min_samples_split() -> usize {
    5
}
fn default_min_samples_leaf() -> usize {
    2
}
fn default_n_trees() -> usize {
    50
}
fn default_seed() -> u64 {
    42
}

impl AlgorithmConfig {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            AlgorithmConfig::LinearGd { .. } => Algorithm::LinearGd,
            AlgorithmConfig::Linear => Algorithm::Linear,
            AlgorithmConfig::Ridge { .. } => Algorithm::Ridge,
            AlgorithmConfig::DecisionTree { .. } => Algorithm::DecisionTree,
            AlgorithmConfig::RandomForest { .. } => Algorithm::RandomForest,
        }
    }
}

/// One entry of the model roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ModelConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub algorithm: AlgorithmConfig,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, algorithm: AlgorithmConfig) -> Self {
        Self {
            name: name.into(),
            algorithm,
        }
    }
}

/// Training Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub models: Vec<ModelConfig>,
    /// Fit models on the rayon thread pool instead of one after another
    pub parallel: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let mut models = vec![ModelConfig::new(
            "linear_gd",
            AlgorithmConfig::LinearGd {
                learning_rate: default_learning_rate(),
                max_iterations: default_max_iterations(),
            },
        )];
        if cfg!(feature = "ml") {
            models.extend([
                ModelConfig::new("linear", AlgorithmConfig::Linear),
                ModelConfig::new("ridge", AlgorithmConfig::Ridge { alpha: default_alpha() }),
                ModelConfig::new(
                    "forest",
                    AlgorithmConfig::RandomForest {
                        n_trees: default_n_trees(),
                        max_depth: Some(10),
                        min_samples_split: default_min_samples_split(),
                        min_samples_leaf: default_min_samples_leaf(),
                        seed: default_seed(),
                    },
                ),
            ]);
        }
        Self {
            models,
            parallel: false,
        }
    }
}

/// A model that was configured but could not be trained
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFitFailure {
    pub name: String,
    pub error: PipelineError,
}

/// Result of a training batch: every model that fitted, plus the ones that did not
#[derive(Default)]
pub struct TrainedModels {
    pub models: BTreeMap<String, Box<dyn MLModel>>,
    pub failures: Vec<ModelFitFailure>,
}

impl TrainedModels {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Model Trainer
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit every configured model on the same training data.
    ///
    /// Only an empty dataset or a duplicated model name fails the batch.
    pub fn train_all(&self, dataset: &TrainingDataset) -> Result<TrainedModels> {
        if dataset.is_empty() {
            return Err(PipelineError::Data(
                "cannot train on an empty training partition".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.config.models.iter().find(|m| !seen.insert(m.name.as_str())) {
            return Err(PipelineError::Config(format!(
                "model name '{}' is configured more than once",
                dup.name
            )));
        }

        info!(
            models = self.config.models.len(),
            samples = dataset.len(),
            parallel = self.config.parallel,
            "training models"
        );

        let slots: Vec<(String, Result<Box<dyn MLModel>>)> = if self.config.parallel {
            self.config
                .models
                .par_iter()
                .map(|model| (model.name.clone(), isolated_run_task(model, dataset)))
                .collect()
        } else {
            self.config
                .models
                .iter()
                .map(|model| (model.name.clone(), isolated_run_task(model, dataset)))
                .collect()
        };

        let mut trained = TrainedModels::default();
        for (name, result) in slots {
            match result {
                Ok(model) => {
                    trained.models.insert(name, model);
                }
                Err(error) => {
                    warn!(model = %name, %error, "model excluded from results");
                    trained.failures.push(ModelFitFailure { name, error });
                }
            }
        }

        Ok(trained)
    }
}

/// Run one task so that a panic inside it becomes that model's `ModelFit` error
fn isolated_run_task(model: &ModelConfig, dataset: &TrainingDataset) -> Result<Box<dyn MLModel>> {
    isolate(&model.name, || run_task(model, dataset))
}

fn isolate<T>(name: &str, task: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .unwrap_or_else(|_| Err(PipelineError::model_fit(name, "training task panicked")))
}

/// Train one configured model; every failure becomes a `ModelFit` error
fn run_task(model: &ModelConfig, dataset: &TrainingDataset) -> Result<Box<dyn MLModel>> {
    let started = Instant::now();
    let result = fit(model, dataset).map_err(|e| match e {
        PipelineError::ModelFit { .. } => e,
        other => PipelineError::model_fit(&model.name, other),
    });

    if let Ok(trained) = &result {
        let metrics = &trained.metadata().training_metrics;
        info!(
            model = %model.name,
            algorithm = %model.algorithm.algorithm(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            train_rmse = metrics.rmse,
            train_r2 = metrics.r2,
            "model trained"
        );
    }
    result
}

fn fit(model: &ModelConfig, dataset: &TrainingDataset) -> Result<Box<dyn MLModel>> {
    match &model.algorithm {
        AlgorithmConfig::LinearGd {
            learning_rate,
            max_iterations,
        } => Ok(Box::new(LinearRegressionModel::train(
            &model.name,
            &dataset.features,
            &dataset.targets,
            *learning_rate,
            *max_iterations,
        )?)),
        #[cfg(feature = "ml")]
        other => Ok(Box::new(super::smartcore::SmartcoreRegressor::train(
            &model.name,
            other,
            &dataset.features,
            &dataset.targets,
        )?)),
        #[cfg(not(feature = "ml"))]
        other => Err(PipelineError::model_fit(
            &model.name,
            format!(
                "algorithm '{}' requires the `ml` feature",
                other.algorithm()
            ),
        )),
    }
}
