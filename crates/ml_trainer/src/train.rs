//! End-to-end training run
//!
//! read → split → extract target → fit transformer → train → compose →
//! evaluate → write metrics → save model. Errors propagate unchanged.

use mlpipe_core::{
    build_transformer, create_inference_pipeline, drop_target, evaluate_model, extract_target,
    fit_transformer, make_features, model_hash_hex, predict_probabilities, save_model,
    split_train_val, train_model, write_metrics, Dataset, InferencePipeline, Metrics, Result,
    TrainPipelineParams,
};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::telemetry::RunContext;

/// What a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model_path: PathBuf,
    pub metric_path: PathBuf,
    pub metrics: Metrics,
    pub model_hash: String,
    pub pipeline: InferencePipeline,
}

pub fn train_pipeline(params: &TrainPipelineParams, ctx: &RunContext) -> Result<TrainOutcome> {
    let _run = ctx.span().enter();
    info!("Start training pipeline with params {:?}", params);

    debug!("Read data...");
    let data = Dataset::from_csv(&params.input_data_path)?;
    for (column, missing) in data.missing_counts().into_iter().filter(|(_, m)| *m > 0) {
        debug!("  column {} has {} missing values", column, missing);
    }

    debug!("Split data...");
    let (train_df, val_df) = split_train_val(&data, &params.splitting_params)?;
    info!("train_df shape is ({}, {})", train_df.len(), train_df.width());
    info!("val_df shape is ({}, {})", val_df.len(), val_df.width());

    let feature_params = &params.feature_params;
    let train_target = extract_target(&train_df, feature_params)?;
    let train_df = drop_target(&train_df, feature_params)?;
    let val_target = extract_target(&val_df, feature_params)?;
    let val_df = drop_target(&val_df, feature_params)?;

    let transformer = build_transformer(feature_params);
    let (transformer, train) = fit_transformer(transformer, &train_df)?;
    let train_features = make_features(&transformer, &train)?;
    info!(
        "train_features shape is ({}, {})",
        train_features.n_rows(),
        train_features.n_features()
    );

    debug!("Train model...");
    let model = train_model(&train_features, &train_target, &params.train_params)?;

    let inference_pipeline = create_inference_pipeline(model, transformer)?;

    debug!("Validate model...");
    let probabilities = predict_probabilities(&inference_pipeline, &val_df)?;
    let metrics = evaluate_model(&probabilities, &val_target)?;

    write_metrics(&metrics, &params.metric_path)?;
    info!("metrics is {:?}", metrics);

    let model_path = save_model(&inference_pipeline, &params.output_model_path)?;
    let model_hash = model_hash_hex(&inference_pipeline)?;
    info!(
        "Training finished in {:.2?}, model hash {}",
        ctx.elapsed(),
        model_hash
    );

    Ok(TrainOutcome {
        model_path,
        metric_path: params.metric_path.clone(),
        metrics,
        model_hash,
        pipeline: inference_pipeline,
    })
}
