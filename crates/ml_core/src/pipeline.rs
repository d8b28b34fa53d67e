//! Inference pipeline: fitted transformer + fitted model as one artifact
//!
//! The pipeline always pushes raw tables through the training-time
//! transformer before the model sees them. It is persisted as pretty JSON
//! with sorted object keys and a small metadata header, so the same pipeline
//! always serializes to the same bytes and hash.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dataset::Dataset;
use crate::errors::{PipelineError, Result};
use crate::features::{make_features, FeatureTransformer};
use crate::model::{Classifier, Model, ModelType};

/// Artifact format version written by `save_model`
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub version: u32,
    /// Seconds since the Unix epoch
    pub created_at: i64,
    pub model_type: ModelType,
    pub feature_names: Vec<String>,
    pub crate_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferencePipeline {
    pub metadata: ArtifactMetadata,
    transformer: FeatureTransformer,
    model: Model,
}

impl InferencePipeline {
    pub fn transformer(&self) -> &FeatureTransformer {
        &self.transformer
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Positive-class probabilities for a raw table
    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f64>> {
        let features = make_features(&self.transformer, data)?;
        self.model.predict_proba(&features)
    }

    /// Hard 0/1 predictions for a raw table
    pub fn predict(&self, data: &Dataset) -> Result<Vec<u8>> {
        let features = make_features(&self.transformer, data)?;
        self.model.predict(&features)
    }

    fn validate(&self) -> Result<()> {
        if self.metadata.version != ARTIFACT_VERSION {
            return Err(PipelineError::format(format!(
                "unsupported artifact version {}",
                self.metadata.version
            )));
        }
        let names = self.transformer.feature_names()?;
        if names.len() != self.model.n_features() {
            return Err(PipelineError::format(format!(
                "transformer produces {} features, model expects {}",
                names.len(),
                self.model.n_features()
            )));
        }
        self.model.validate()
    }
}

/// Compose a fitted model and a fitted transformer
pub fn create_inference_pipeline(
    model: Model,
    transformer: FeatureTransformer,
) -> Result<InferencePipeline> {
    let feature_names = transformer.feature_names()?;
    if feature_names.len() != model.n_features() {
        return Err(PipelineError::config(format!(
            "transformer produces {} features, model expects {}",
            feature_names.len(),
            model.n_features()
        )));
    }

    Ok(InferencePipeline {
        metadata: ArtifactMetadata {
            version: ARTIFACT_VERSION,
            created_at: Utc::now().timestamp(),
            model_type: model.model_type(),
            feature_names,
            crate_version: crate::VERSION.to_string(),
        },
        transformer,
        model,
    })
}

pub fn predict_probabilities(pipeline: &InferencePipeline, data: &Dataset) -> Result<Vec<f64>> {
    pipeline.predict_proba(data)
}

/// Artifact text for a pipeline
///
/// Goes through `serde_json::Value`, whose `Map` keeps keys sorted, so
/// struct field order does not leak into the file.
fn artifact_json(pipeline: &InferencePipeline) -> Result<String> {
    let value = serde_json::to_value(pipeline)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Serialize the pipeline to a single artifact file, overwriting it
pub fn save_model<P: AsRef<Path>>(pipeline: &InferencePipeline, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| PipelineError::file(parent, err))?;
    }

    let json = artifact_json(pipeline)?;
    fs::write(path, &json).map_err(|err| PipelineError::file(path, err))?;

    info!(
        "saved {:?} model to {}",
        pipeline.metadata.model_type,
        path.display()
    );
    Ok(path.to_path_buf())
}

/// Load and validate a pipeline artifact
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<InferencePipeline> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|err| PipelineError::file(path, err))?;
    let pipeline: InferencePipeline = serde_json::from_str(&json)
        .map_err(|err| PipelineError::format(format!("{}: {}", path.display(), err)))?;
    pipeline.validate()?;
    Ok(pipeline)
}

/// BLAKE3 hash of the artifact bytes `save_model` writes, hex encoded
pub fn model_hash_hex(pipeline: &InferencePipeline) -> Result<String> {
    let json = artifact_json(pipeline)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Cell;
    use crate::features::{build_transformer, fit_transformer, FeatureParams};
    use crate::model::{train_model, TrainingParams};

    fn dataset() -> Dataset {
        let xs: Vec<Cell> = (0..20).map(|i| Cell::Number(i as f64)).collect();
        let colors: Vec<Cell> = (0..20)
            .map(|i| Cell::Text(if i % 2 == 0 { "red" } else { "blue" }.into()))
            .collect();
        Dataset::from_columns(vec!["x".into(), "color".into()], vec![xs, colors]).unwrap()
    }

    fn params() -> FeatureParams {
        FeatureParams {
            target_col: "target".into(),
            categorical_features: vec!["color".into()],
            numerical_features: vec!["x".into()],
            features_to_drop: vec![],
            normalize_numerical: true,
        }
    }

    fn fitted_pipeline() -> Result<InferencePipeline> {
        let data = dataset();
        let labels: Vec<u8> = (0..20).map(|i| (i >= 10) as u8).collect();
        let (transformer, projected) = fit_transformer(build_transformer(&params()), &data)?;
        let features = make_features(&transformer, &projected)?;
        let model = train_model(&features, &labels, &TrainingParams::new(ModelType::LogisticRegression))?;
        create_inference_pipeline(model, transformer)
    }

    #[test]
    fn test_unfit_transformer_rejected() -> Result<()> {
        let pipeline = fitted_pipeline()?;
        let err = create_inference_pipeline(pipeline.model().clone(), build_transformer(&params()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::State(_)));
        Ok(())
    }

    #[test]
    fn test_pipeline_applies_transformer() -> Result<()> {
        let pipeline = fitted_pipeline()?;
        let probs = pipeline.predict_proba(&dataset())?;
        assert_eq!(probs.len(), 20);
        assert!(probs[19] > probs[0]);
        assert_eq!(pipeline.metadata.feature_names.len(), 3);
        Ok(())
    }

    #[test]
    fn test_save_overwrites_and_loads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("models").join("model.pkl");
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, "stale")?;

        let pipeline = fitted_pipeline()?;
        let saved = save_model(&pipeline, &path)?;
        assert_eq!(saved, path);

        let loaded = load_model(&path)?;
        assert_eq!(loaded, pipeline);
        assert_eq!(model_hash_hex(&loaded)?, model_hash_hex(&pipeline)?);
        Ok(())
    }

    #[test]
    fn test_artifact_is_stable_and_hashed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let pipeline = fitted_pipeline()?;
        let first = std::fs::read(save_model(&pipeline, dir.path().join("a.pkl"))?)?;
        let second = std::fs::read(save_model(&pipeline, dir.path().join("b.pkl"))?)?;
        assert_eq!(first, second);

        let hash = model_hash_hex(&pipeline)?;
        assert_eq!(hash, hex::encode(blake3::hash(&first).as_bytes()));
        assert_eq!(hash.len(), 64);

        // top-level keys come out sorted, not in field order
        let text = String::from_utf8(first)?;
        let metadata = text.find("\"metadata\"").unwrap();
        let model = text.find("\"model\"").unwrap();
        let transformer = text.find("\"transformer\"").unwrap();
        assert!(metadata < model && model < transformer);
        let version = text.find("\"version\"").unwrap();
        let created_at = text.find("\"created_at\"").unwrap();
        assert!(created_at < version);
        Ok(())
    }

    #[test]
    fn test_load_rejects_garbage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.pkl");
        std::fs::write(&path, "{not json")?;
        assert!(matches!(load_model(&path), Err(PipelineError::Format(_))));
        assert!(matches!(
            load_model(dir.path().join("absent.pkl")),
            Err(PipelineError::File { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_load_rejects_unknown_version() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.pkl");
        let mut pipeline = fitted_pipeline()?;
        pipeline.metadata.version = 99;
        save_model(&pipeline, &path)?;
        assert!(matches!(load_model(&path), Err(PipelineError::Format(_))));
        Ok(())
    }
}
