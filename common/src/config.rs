use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    #[serde(default = "default_pipeline_config")]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Root directory of the warehouse on the local filesystem.
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        batch_size: default_batch_size(),
        top_n: default_top_n(),
    }
}

fn default_batch_size() -> usize {
    8192
}

fn default_top_n() -> usize {
    10
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Build the configuration
        let config = builder.build()?;

        // Try to deserialize the entire configuration
        let settings: Settings = config.try_deserialize()?;

        debug!(
            root = %settings.storage.root,
            batch_size = settings.pipeline.batch_size,
            "Loaded warehouse settings"
        );

        Ok(settings)
    }
}
