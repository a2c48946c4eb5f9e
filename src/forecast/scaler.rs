//! Feature standardization fitted on the training partition only

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{FeatureSchema, FeatureVector};
use crate::error::{PipelineError, Result};

/// What to do with a feature whose training standard deviation is zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVariancePolicy {
    /// Abort the fit with a data error
    #[default]
    Reject,
    /// Center the feature but leave it unscaled (std treated as 1)
    PassThrough,
}

/// Per-feature mean and standard deviation, immutable once fitted
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingParameters {
    schema: FeatureSchema,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl ScalingParameters {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Standardize one vector; values are matched to the fitted schema by name
    pub fn transform(&self, vector: &FeatureVector) -> Result<FeatureVector> {
        let aligned = vector.aligned_to(&self.schema)?;
        let standardized = aligned
            .values()
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (mean, std))| (v - mean) / std)
            .collect();

        FeatureVector::new(self.schema.clone(), standardized)
    }

    pub fn transform_batch(&self, vectors: &[FeatureVector]) -> Result<Vec<FeatureVector>> {
        vectors.iter().map(|v| self.transform(v)).collect()
    }
}

/// Z-score scaler
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScaler {
    zero_variance: ZeroVariancePolicy,
}

impl StandardScaler {
    pub fn new(zero_variance: ZeroVariancePolicy) -> Self {
        Self { zero_variance }
    }

    /// Compute population mean and standard deviation per feature
    pub fn fit(&self, train: &[FeatureVector]) -> Result<ScalingParameters> {
        let first = train
            .first()
            .ok_or_else(|| PipelineError::Data("cannot fit scaler on an empty partition".to_string()))?;
        let schema = first.schema().clone();

        if let Some(other) = train.iter().find(|v| v.schema() != &schema) {
            return Err(PipelineError::schema(
                schema.features(),
                other.schema().features(),
            ));
        }

        let n = train.len() as f64;
        let mut sums = vec![0.0; schema.len()];
        for vector in train {
            for (sum, v) in sums.iter_mut().zip(vector.values()) {
                *sum += v;
            }
        }
        let means: Vec<f64> = sums.iter().map(|s| s / n).collect();

        let mut squares = vec![0.0; schema.len()];
        for vector in train {
            for ((sq, v), mean) in squares.iter_mut().zip(vector.values()).zip(&means) {
                *sq += (v - mean).powi(2);
            }
        }
        let variances = squares.into_iter().map(|sq| sq / n);

        let stds = schema
            .features()
            .iter()
            .zip(variances)
            .map(|(feature, var)| {
                let std = var.sqrt();
                if std.is_finite() && std > 1e-12 {
                    Ok(std)
                } else {
                    match self.zero_variance {
                        ZeroVariancePolicy::PassThrough if std.is_finite() => Ok(1.0),
                        _ => Err(PipelineError::Data(format!(
                            "feature '{}' has zero variance in the training partition",
                            feature
                        ))),
                    }
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(features = schema.len(), samples = train.len(), "fitted standard scaler");

        Ok(ScalingParameters {
            schema,
            means,
            stds,
        })
    }
}
