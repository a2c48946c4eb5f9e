//! One-step-ahead power forecasting
//!
//! Feature construction, chronological splitting, scaling, the persistence
//! baseline, metrics and reporting, and the end-to-end [`ForecastPipeline`].

pub mod features;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod scaler;

pub use features::{
    build_one_hour_ahead_table, chronological_split, feature_overview, persistence_series, Feature,
    FeatureSchema, FeatureStats, FeatureVector, PersistenceSeries, SupervisedExample,
};
pub use metrics::{evaluate, ForecastMetrics};
pub use persistence::PersistenceBaseline;
pub use pipeline::{ForecastPipeline, PipelineOptions, PipelineRun};
pub use report::{comparison_window, ComparisonWindow, MetricReport};
pub use scaler::{ScalingParameters, StandardScaler, ZeroVariancePolicy};
