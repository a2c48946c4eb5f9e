//! One-hour-ahead wind power forecasting: a persistence baseline compared
//! against regression models trained on the same chronological split.

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod interactive;
pub mod ml;
pub mod telemetry;

pub use error::{PipelineError, Result};
