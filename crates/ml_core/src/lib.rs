//! mlpipe core: tabular training building blocks
//!
//! Every stage of the training pipeline is a plain function over owned or
//! borrowed values, so the pipeline reads as a straight sequence:
//!
//! - `dataset`: CSV loading and pure table operations
//! - `split`: seeded train/validation split
//! - `features`: target extraction and the fit-once feature transformer
//! - `model`: logistic regression and random forest classifiers
//! - `pipeline`: transformer + model as one persisted artifact
//! - `metrics`: evaluation and metrics JSON
//! - `config`: the validated run configuration

pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod features;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod split;

pub use config::{read_train_pipeline_params, TrainPipelineParams};
pub use dataset::{Cell, Dataset};
pub use errors::{PipelineError, Result};
pub use features::{
    build_transformer, drop_target, extract_target, fit_transformer, make_features,
    FeatureMatrix, FeatureParams, FeatureTransformer, Labels,
};
pub use metrics::{evaluate_model, read_metrics, write_metrics, Metrics};
pub use model::{
    threshold_labels, train_model, Classifier, MaxFeatures, Model, ModelType, TrainingParams,
};
pub use pipeline::{
    create_inference_pipeline, load_model, model_hash_hex, predict_probabilities, save_model,
    InferencePipeline,
};
pub use split::{split_train_val, SplitParams};

/// Crate version string, recorded in model artifacts
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
