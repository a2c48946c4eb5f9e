//! ML Model Inference Engine
//!
//! Runs the trained models on a scaled test set, and on a single
//! operator-supplied parameter set scaled with the stored training parameters.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::models::MLModel;
use crate::error::{PipelineError, Result};
use crate::forecast::features::{Feature, FeatureSchema, FeatureVector, PersistenceSeries};
use crate::forecast::persistence::PersistenceBaseline;
use crate::forecast::scaler::ScalingParameters;
use crate::domain::MeasurementTable;

/// Predictions per model name, index-aligned with the rows they were made for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSet {
    series: BTreeMap<String, Vec<f64>>,
}

impl PredictionSet {
    pub fn insert(&mut self, model_name: &str, predictions: Vec<f64>) -> Option<Vec<f64>> {
        self.series.insert(model_name.to_string(), predictions)
    }

    pub fn get(&self, model_name: &str) -> Option<&[f64]> {
        self.series.get(model_name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.series.iter().map(|(name, s)| (name.as_str(), s.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Inference over the persistence baseline and every trained model
pub struct Predictor {
    models: BTreeMap<String, Box<dyn MLModel>>,
    scaler: Option<ScalingParameters>,
}

impl Predictor {
    pub fn new(models: BTreeMap<String, Box<dyn MLModel>>) -> Self {
        Self {
            models,
            scaler: None,
        }
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn model(&self, name: &str) -> Option<&dyn MLModel> {
        self.models.get(name).map(|m| m.as_ref())
    }

    /// Schema single-sample requests must cover, once the scaler is set
    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.scaler.as_ref().map(ScalingParameters::schema)
    }

    pub fn predict_persistence(&self, table: &MeasurementTable) -> Result<PersistenceSeries> {
        PersistenceBaseline.series(table)
    }

    /// Batch inference on already scaled rows
    pub fn predict_with_models(&self, test_features: &[FeatureVector]) -> Result<PredictionSet> {
        let mut predictions = PredictionSet::default();
        for (name, model) in &self.models {
            let series = model.predict_batch(test_features)?;
            if series.len() != test_features.len() {
                return Err(PipelineError::Shape {
                    context: "model predictions",
                    expected: test_features.len(),
                    found: series.len(),
                });
            }
            predictions.insert(name, series);
        }
        debug!(
            models = predictions.len(),
            rows = test_features.len(),
            "batch predictions complete"
        );
        Ok(predictions)
    }

    /// Store the training scaler; `feature_order` must be the order it was fitted on
    pub fn set_scaler(&mut self, params: ScalingParameters, feature_order: &FeatureSchema) -> Result<()> {
        if params.schema() != feature_order {
            return Err(PipelineError::schema(
                feature_order.features(),
                params.schema().features(),
            ));
        }
        self.scaler = Some(params);
        Ok(())
    }

    /// Predict from one set of named parameters.
    ///
    /// Every feature of the scaler's schema must be present. A supplied
    /// `current_power` also yields a `persistence` entry.
    pub fn predict_all_from_parameters(
        &self,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, f64>> {
        let scaler = self.scaler.as_ref().ok_or(PipelineError::ScalerNotConfigured)?;
        let schema = scaler.schema();

        let mut named = BTreeMap::new();
        for (name, value) in parameters {
            match name.parse::<Feature>() {
                Ok(feature) => {
                    named.insert(feature, *value);
                }
                Err(_) => warn!(parameter = %name, "ignoring unknown parameter"),
            }
        }

        let row = scaler.transform(&schema.vector_from_values(&named)?)?;

        let mut results = BTreeMap::new();
        for (name, model) in &self.models {
            results.insert(name.clone(), model.predict(&row)?);
        }
        if let Some(current_power) = named.get(&Feature::CurrentPower) {
            results.insert(
                PersistenceBaseline::NAME.to_string(),
                PersistenceBaseline.predict_next(*current_power),
            );
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::hourly_table;
    use crate::forecast::scaler::StandardScaler;
    use crate::ml::models::LinearRegressionModel;

    fn raw_rows(schema: &FeatureSchema) -> Vec<FeatureVector> {
        (0..20)
            .map(|i| {
                let x = i as f64;
                let values = schema
                    .features()
                    .iter()
                    .enumerate()
                    .map(|(j, _)| (x * (j + 1) as f64 * 0.37).sin() * 10.0 + j as f64)
                    .collect();
                FeatureVector::new(schema.clone(), values).unwrap()
            })
            .collect()
    }

    fn fitted(schema: &FeatureSchema) -> (Predictor, ScalingParameters, Vec<FeatureVector>) {
        let raw = raw_rows(schema);
        let params = StandardScaler::default().fit(&raw).unwrap();
        let scaled = params.transform_batch(&raw).unwrap();
        let targets: Vec<f64> = raw.iter().map(|r| r.values().iter().sum()).collect();

        let model = LinearRegressionModel::train("linear_gd", &scaled, &targets, 0.1, 300).unwrap();
        let mut models: BTreeMap<String, Box<dyn MLModel>> = BTreeMap::new();
        models.insert("linear_gd".to_string(), Box::new(model));

        let mut predictor = Predictor::new(models);
        predictor.set_scaler(params.clone(), schema).unwrap();
        (predictor, params, raw)
    }

    fn as_parameters(row: &FeatureVector) -> BTreeMap<String, f64> {
        row.schema()
            .features()
            .iter()
            .zip(row.values())
            .map(|(f, v)| (f.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_single_sample_matches_batch() {
        let schema = FeatureSchema::for_forecast(false);
        let (predictor, params, raw) = fitted(&schema);

        let batch = predictor
            .predict_with_models(&params.transform_batch(&raw).unwrap())
            .unwrap();

        for (i, row) in raw.iter().enumerate() {
            let single = predictor
                .predict_all_from_parameters(&as_parameters(row))
                .unwrap();
            let expected = batch.get("linear_gd").unwrap()[i];
            assert!((single["linear_gd"] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let schema = FeatureSchema::for_forecast(false);
        let (predictor, _, raw) = fitted(&schema);
        let reversed = FeatureSchema::new(schema.features().iter().rev().copied()).unwrap();
        let shuffled = raw[3].aligned_to(&reversed).unwrap();

        let a = predictor.predict_all_from_parameters(&as_parameters(&raw[3])).unwrap();
        let b = predictor.predict_all_from_parameters(&as_parameters(&shuffled)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_scaler_required() {
        let predictor = Predictor::new(BTreeMap::new());
        let result = predictor.predict_all_from_parameters(&BTreeMap::new());
        assert_eq!(result, Err(PipelineError::ScalerNotConfigured));
    }

    #[test]
    fn test_missing_feature_is_named() {
        let schema = FeatureSchema::for_forecast(false);
        let (predictor, _, raw) = fitted(&schema);
        let mut parameters = as_parameters(&raw[0]);
        parameters.remove("windgusts");

        let result = predictor.predict_all_from_parameters(&parameters);
        assert_eq!(
            result,
            Err(PipelineError::MissingFeature {
                feature: "windgusts".to_string()
            })
        );
    }

    #[test]
    fn test_current_power_adds_persistence() {
        let schema = FeatureSchema::for_forecast(false);
        let (predictor, _, raw) = fitted(&schema);
        let mut parameters = as_parameters(&raw[0]);
        parameters.insert("current_power".to_string(), 42.5);
        parameters.insert("cloud_cover".to_string(), 3.0);

        let results = predictor.predict_all_from_parameters(&parameters).unwrap();
        assert_eq!(results["persistence"], 42.5);
        assert!(results.contains_key("linear_gd"));
    }

    #[test]
    fn test_set_scaler_rejects_other_order() {
        let schema = FeatureSchema::for_forecast(false);
        let (mut predictor, params, _) = fitted(&schema);
        let other = FeatureSchema::for_forecast(true);
        assert!(matches!(
            predictor.set_scaler(params, &other),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn test_batch_rejects_unscaled_schema() {
        let schema = FeatureSchema::for_forecast(false);
        let (predictor, _, _) = fitted(&schema);
        let foreign = raw_rows(&FeatureSchema::for_forecast(true));
        assert!(matches!(
            predictor.predict_with_models(&foreign),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn test_predict_persistence_delegates() {
        let predictor = Predictor::new(BTreeMap::new());
        let series = predictor
            .predict_persistence(&hourly_table(&[10.0, 12.0, 11.0]))
            .unwrap();
        assert_eq!(series.y_pred, vec![10.0, 12.0]);
        assert_eq!(series.y_true, vec![12.0, 11.0]);
    }
}
