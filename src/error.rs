//! Error taxonomy for the forecasting pipeline.

use thiserror::Error;

/// Errors raised by the forecasting core.
///
/// `ModelFit` is isolated per algorithm by the trainer; every other variant
/// aborts the operation that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Schema mismatch: expected [{expected}], found [{found}]")]
    Schema { expected: String, found: String },

    #[error("Missing feature '{feature}' in prediction request")]
    MissingFeature { feature: String },

    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    Shape {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Model '{model}' failed to fit: {reason}")]
    ModelFit { model: String, reason: String },

    #[error("Scaler not configured: call set_scaler before single-sample prediction")]
    ScalerNotConfigured,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn schema<A, B>(expected: A, found: B) -> Self
    where
        A: IntoIterator,
        A::Item: std::fmt::Display,
        B: IntoIterator,
        B::Item: std::fmt::Display,
    {
        use itertools::Itertools;
        PipelineError::Schema {
            expected: expected.into_iter().join(", "),
            found: found.into_iter().join(", "),
        }
    }

    pub(crate) fn model_fit(model: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PipelineError::ModelFit {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_feature_names_field() {
        let err = PipelineError::MissingFeature {
            feature: "windgusts".to_string(),
        };
        assert!(err.to_string().contains("'windgusts'"));
    }

    #[test]
    fn test_schema_error_lists_both_sides() {
        let err = PipelineError::schema(["a", "b"], ["b"]);
        assert_eq!(err.to_string(), "Schema mismatch: expected [a, b], found [b]");
    }
}
