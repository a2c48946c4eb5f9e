use anyhow::{Context, Result};
use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::domain::Location;
use crate::forecast::{PipelineOptions, ZeroVariancePolicy};
use crate::ml::{ModelConfig, TrainingConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "OEC_FORECAST__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub data: DataConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[validate(length(min = 1, message = "at least one model must be configured"), nested)]
    pub models: Vec<ModelConfig>,
    #[validate(nested)]
    pub report: ReportConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    /// Directory holding `Location{n}.csv`
    pub dir: PathBuf,
    /// Skip the location prompt when set
    pub location: Option<Location>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("inputs"),
            location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_fraction: f64,
    #[validate(range(min = 1))]
    pub sampling_interval_minutes: u32,
    pub include_current_power: bool,
    pub zero_variance: ZeroVariancePolicy,
    pub parallel_training: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            sampling_interval_minutes: 60,
            include_current_power: false,
            zero_variance: ZeroVariancePolicy::Reject,
            parallel_training: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportConfig {
    #[validate(range(min = 1))]
    pub comparison_window: usize,
    pub comparison_csv: Option<PathBuf>,
    pub metrics_json: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            comparison_window: 500,
            comparison_csv: None,
            metrics_json: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Config = Self::figment(path.as_ref())
            .extract()
            .context("reading configuration")?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Defaults, then the TOML file, then `OEC_FORECAST__*` environment variables
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::with_default_roster()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn with_default_roster() -> Self {
        Self {
            models: TrainingConfig::default().models,
            ..Self::default()
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            test_fraction: self.pipeline.test_fraction,
            sampling_interval: Duration::minutes(i64::from(self.pipeline.sampling_interval_minutes)),
            include_current_power: self.pipeline.include_current_power,
            zero_variance: self.pipeline.zero_variance,
            training: TrainingConfig {
                models: self.models.clone(),
                parallel: self.pipeline.parallel_training,
            },
        }
    }
}
