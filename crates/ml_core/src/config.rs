//! Training run configuration
//!
//! `TrainPipelineParams` is read once from a YAML or TOML file, validated,
//! and then treated as immutable for the rest of the run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};
use crate::features::FeatureParams;
use crate::model::TrainingParams;
use crate::split::SplitParams;

/// Root configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainPipelineParams {
    /// CSV dataset to train on
    pub input_data_path: PathBuf,
    /// Where the inference pipeline artifact is written
    pub output_model_path: PathBuf,
    /// Where the metrics JSON is written
    pub metric_path: PathBuf,
    /// Optional file that receives a copy of the run's log lines
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub splitting_params: SplitParams,
    pub feature_params: FeatureParams,
    pub train_params: TrainingParams,
}

impl TrainPipelineParams {
    pub fn validate(&self) -> Result<()> {
        for (field, path) in [
            ("input_data_path", &self.input_data_path),
            ("output_model_path", &self.output_model_path),
            ("metric_path", &self.metric_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::config(format!("{} is empty", field)));
            }
        }
        if self.output_model_path == self.metric_path {
            return Err(PipelineError::config(
                "output_model_path and metric_path point to the same file",
            ));
        }

        self.splitting_params.validate()?;
        self.feature_params.validate()?;
        self.train_params.validate()
    }

    /// Parse from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let params: Self =
            serde_yaml::from_str(text).map_err(|err| PipelineError::config(err.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let params: Self =
            toml::from_str(text).map_err(|err| PipelineError::config(err.to_string()))?;
        params.validate()?;
        Ok(params)
    }
}

/// Read and validate a config file; `.toml` files are parsed as TOML,
/// everything else as YAML
pub fn read_train_pipeline_params<P: AsRef<Path>>(path: P) -> Result<TrainPipelineParams> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| PipelineError::file(path, err))?;

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => TrainPipelineParams::from_toml_str(&text),
        _ => TrainPipelineParams::from_yaml_str(&text),
    };

    parsed.map_err(|err| match err {
        PipelineError::Config(msg) => {
            PipelineError::config(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
