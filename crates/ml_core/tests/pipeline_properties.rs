//! Cross-module properties of the training building blocks

use anyhow::Result;
use mlpipe_core::{
    build_transformer, create_inference_pipeline, drop_target, evaluate_model, extract_target,
    fit_transformer, load_model, make_features, save_model, split_train_val, train_model, Dataset,
    FeatureParams, ModelType, SplitParams, TrainingParams,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn create_csv(rows: usize, offset: usize) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "thal,slope,trestbps,oldpeak,condition")?;
    for i in offset..offset + rows {
        let thal = ["normal", "fixed", "reversable"][i % 3];
        let slope = i % 3;
        let trestbps = 110 + (i * 11) % 60;
        let oldpeak = ((i * 3) % 40) as f64 / 10.0;
        let condition = u8::from(oldpeak > 1.8 || thal == "reversable");
        writeln!(file, "{},{},{},{},{}", thal, slope, trestbps, oldpeak, condition)?;
    }
    file.flush()?;
    Ok(file)
}

fn feature_params() -> FeatureParams {
    FeatureParams {
        target_col: "condition".into(),
        categorical_features: vec!["thal".into(), "slope".into()],
        numerical_features: vec!["trestbps".into(), "oldpeak".into()],
        features_to_drop: vec![],
        normalize_numerical: true,
    }
}

#[test]
fn test_feature_width_matches_across_datasets() -> Result<()> {
    let a = Dataset::from_csv(create_csv(60, 0)?.path())?;
    let b = Dataset::from_csv(create_csv(7, 500)?.path())?;
    let params = feature_params();

    let a = drop_target(&a, &params)?;
    let b = drop_target(&b, &params)?;
    let (transformer, projected) = fit_transformer(build_transformer(&params), &a)?;

    let on_a = make_features(&transformer, &projected)?;
    let on_b = make_features(&transformer, &b)?;
    assert_eq!(on_a.n_features(), on_b.n_features());
    assert_eq!(on_b.n_rows(), 7);
    // 3 thal + 3 slope + 2 numerical
    assert_eq!(on_a.n_features(), 8);
    Ok(())
}

#[test]
fn test_end_to_end_round_trip() -> Result<()> {
    let file = create_csv(120, 0)?;
    let data = Dataset::from_csv(file.path())?;
    let params = feature_params();

    let (train, val) = split_train_val(&data, &SplitParams::default())?;
    let train_target = extract_target(&train, &params)?;
    let val_target = extract_target(&val, &params)?;
    let train = drop_target(&train, &params)?;
    let val = drop_target(&val, &params)?;

    let (transformer, train) = fit_transformer(build_transformer(&params), &train)?;
    let features = make_features(&transformer, &train)?;

    let mut train_params = TrainingParams::new(ModelType::RandomForestClassifier);
    train_params.n_estimators = 15;
    let model = train_model(&features, &train_target, &train_params)?;
    let pipeline = create_inference_pipeline(model, transformer)?;

    let probabilities = pipeline.predict_proba(&val)?;
    let metrics = evaluate_model(&probabilities, &val_target)?;
    assert_eq!(metrics, evaluate_model(&probabilities, &val_target)?);
    assert!(metrics["roc_auc"] > 0.8, "roc_auc {}", metrics["roc_auc"]);

    let dir = tempfile::tempdir()?;
    let path = save_model(&pipeline, dir.path().join("model.pkl"))?;
    let restored = load_model(&path)?;
    assert_eq!(restored.predict_proba(&val)?, probabilities);
    Ok(())
}
