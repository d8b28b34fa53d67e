//! Binary classifiers and the model trainer
//!
//! Two model kinds are supported, selected by `TrainingParams::model_type`:
//! - `LogisticRegression`: gradient-descent logistic regression
//! - `RandomForestClassifier`: bagged Gini CART trees

pub mod forest;
pub mod logistic;
pub mod tree;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::errors::{PipelineError, Result};
use crate::features::FeatureMatrix;

pub use forest::RandomForest;
pub use logistic::LogisticRegression;
pub use tree::{CartBuilder, Node, Tree, TreeConfig};

/// Probability threshold for the positive class
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Hard 0/1 labels from positive-class probabilities
pub fn threshold_labels(probabilities: &[f64]) -> Vec<u8> {
    probabilities
        .iter()
        .map(|&p| u8::from(p >= DECISION_THRESHOLD))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    LogisticRegression,
    RandomForestClassifier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// sqrt(n_features), rounded down, at least 1
    Sqrt,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => n_features,
        }
    }
}

/// Classifier hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingParams {
    pub model_type: ModelType,
    #[serde(default = "defaults::random_state")]
    pub random_state: u64,

    // Random forest
    #[serde(default = "defaults::n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "defaults::max_depth")]
    pub max_depth: usize,
    #[serde(default = "defaults::min_samples_leaf")]
    pub min_samples_leaf: usize,
    #[serde(default = "defaults::max_features")]
    pub max_features: MaxFeatures,

    // Logistic regression
    #[serde(default = "defaults::max_iter")]
    pub max_iter: usize,
    #[serde(default = "defaults::learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "defaults::l2_penalty")]
    pub l2_penalty: f64,
    #[serde(default = "defaults::tolerance")]
    pub tolerance: f64,
}

mod defaults {
    use super::MaxFeatures;

    pub fn random_state() -> u64 {
        42
    }
    pub fn n_estimators() -> usize {
        100
    }
    pub fn max_depth() -> usize {
        8
    }
    pub fn min_samples_leaf() -> usize {
        1
    }
    pub fn max_features() -> MaxFeatures {
        MaxFeatures::Sqrt
    }
    pub fn max_iter() -> usize {
        1000
    }
    pub fn learning_rate() -> f64 {
        0.1
    }
    pub fn l2_penalty() -> f64 {
        1e-4
    }
    pub fn tolerance() -> f64 {
        1e-6
    }
}

impl TrainingParams {
    /// Defaults for the given model kind
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            random_state: defaults::random_state(),
            n_estimators: defaults::n_estimators(),
            max_depth: defaults::max_depth(),
            min_samples_leaf: defaults::min_samples_leaf(),
            max_features: defaults::max_features(),
            max_iter: defaults::max_iter(),
            learning_rate: defaults::learning_rate(),
            l2_penalty: defaults::l2_penalty(),
            tolerance: defaults::tolerance(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(PipelineError::config(format!("train_params.{}", msg)))
            }
        };

        check(self.n_estimators >= 1, "n_estimators must be at least 1")?;
        check(self.max_depth >= 1, "max_depth must be at least 1")?;
        check(self.min_samples_leaf >= 1, "min_samples_leaf must be at least 1")?;
        check(self.max_iter >= 1, "max_iter must be at least 1")?;
        check(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning_rate must be positive",
        )?;
        check(
            self.l2_penalty.is_finite() && self.l2_penalty >= 0.0,
            "l2_penalty must be non-negative",
        )?;
        check(
            self.tolerance.is_finite() && self.tolerance >= 0.0,
            "tolerance must be non-negative",
        )
    }
}

/// Shared predict interface for fitted classifiers
pub trait Classifier {
    /// Number of features the classifier was trained on
    fn n_features(&self) -> usize;

    /// Probability of the positive class for one feature row
    fn probability(&self, row: &[f64]) -> f64;

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_features() != self.n_features() {
            return Err(PipelineError::config(format!(
                "model expects {} features, got {}",
                self.n_features(),
                features.n_features()
            )));
        }
        Ok(features.rows.iter().map(|row| self.probability(row)).collect())
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<u8>> {
        Ok(threshold_labels(&self.predict_proba(features)?))
    }
}

/// A fitted classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub n_features: usize,
    pub estimator: Estimator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
}

impl Model {
    pub fn model_type(&self) -> ModelType {
        match self.estimator {
            Estimator::LogisticRegression(_) => ModelType::LogisticRegression,
            Estimator::RandomForest(_) => ModelType::RandomForestClassifier,
        }
    }

    /// Structural check used when loading persisted models
    pub fn validate(&self) -> Result<()> {
        match &self.estimator {
            Estimator::LogisticRegression(lr) => {
                if lr.weights.len() != self.n_features {
                    return Err(PipelineError::format(format!(
                        "logistic regression has {} weights for {} features",
                        lr.weights.len(),
                        self.n_features
                    )));
                }
            }
            Estimator::RandomForest(forest) => {
                if forest.trees.is_empty() {
                    return Err(PipelineError::format("random forest has no trees"));
                }
                for (i, tree) in forest.trees.iter().enumerate() {
                    tree.validate(self.n_features).map_err(|e| {
                        PipelineError::format(format!("tree {} validation failed: {}", i, e))
                    })?;
                }
            }
        }
        Ok(())
    }
}

impl Classifier for Model {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn probability(&self, row: &[f64]) -> f64 {
        match &self.estimator {
            Estimator::LogisticRegression(lr) => lr.probability(row),
            Estimator::RandomForest(forest) => forest.probability(row),
        }
    }
}

/// Fit a classifier on a feature matrix and labels
#[instrument(skip_all, fields(model_type = ?params.model_type, rows = features.n_rows()))]
pub fn train_model(features: &FeatureMatrix, labels: &[u8], params: &TrainingParams) -> Result<Model> {
    params.validate()?;

    if features.n_rows() != labels.len() {
        return Err(PipelineError::config(format!(
            "feature rows ({}) do not match target rows ({})",
            features.n_rows(),
            labels.len()
        )));
    }
    if features.n_rows() == 0 || features.n_features() == 0 {
        return Err(PipelineError::config("cannot train on an empty feature matrix"));
    }
    if let Some(bad) = labels.iter().find(|&&l| l > 1) {
        return Err(PipelineError::config(format!("label {} is not binary", bad)));
    }

    let estimator = match params.model_type {
        ModelType::LogisticRegression => Estimator::LogisticRegression(LogisticRegression::fit(
            features,
            labels,
            params.learning_rate,
            params.l2_penalty,
            params.max_iter,
            params.tolerance,
        )),
        ModelType::RandomForestClassifier => {
            let config = TreeConfig {
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
                max_features: params.max_features.resolve(features.n_features()),
            };
            Estimator::RandomForest(RandomForest::fit(
                features,
                labels,
                params.n_estimators,
                config,
                params.random_state,
            ))
        }
    };

    info!("trained {:?}", params.model_type);
    Ok(Model {
        n_features: features.n_features(),
        estimator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_labels() {
        assert_eq!(threshold_labels(&[0.0, 0.49, 0.5, 0.93]), vec![0, 0, 1, 1]);
    }

    fn data() -> (FeatureMatrix, Vec<u8>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64 / 20.0 - 1.0, ((i * 7) % 11) as f64 / 11.0])
            .collect();
        let labels = (0..40).map(|i| (i >= 20) as u8).collect();
        (FeatureMatrix::new(vec!["a".into(), "b".into()], rows).unwrap(), labels)
    }

    #[test]
    fn test_shape_mismatch_is_config_error() {
        let (features, mut labels) = data();
        labels.pop();
        let err = train_model(&features, &labels, &TrainingParams::new(ModelType::LogisticRegression))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_both_model_types_train() -> Result<()> {
        let (features, labels) = data();
        for model_type in [ModelType::LogisticRegression, ModelType::RandomForestClassifier] {
            let mut params = TrainingParams::new(model_type);
            params.n_estimators = 10;
            let model = train_model(&features, &labels, &params)?;

            assert_eq!(model.model_type(), model_type);
            assert!(model.validate().is_ok());
            let predictions = model.predict(&features)?;
            let correct = predictions.iter().zip(&labels).filter(|(p, l)| p == l).count();
            assert!(correct >= 36, "{:?} got {} of 40", model_type, correct);
        }
        Ok(())
    }

    #[test]
    fn test_training_is_deterministic() -> Result<()> {
        let (features, labels) = data();
        let mut params = TrainingParams::new(ModelType::RandomForestClassifier);
        params.n_estimators = 8;
        assert_eq!(
            train_model(&features, &labels, &params)?,
            train_model(&features, &labels, &params)?
        );
        Ok(())
    }

    #[test]
    fn test_predict_checks_feature_count() -> Result<()> {
        let (features, labels) = data();
        let model = train_model(&features, &labels, &TrainingParams::new(ModelType::LogisticRegression))?;
        let narrow = FeatureMatrix::new(vec!["a".into()], vec![vec![0.0]])?;
        assert!(matches!(model.predict_proba(&narrow), Err(PipelineError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = TrainingParams::new(ModelType::RandomForestClassifier);
        params.n_estimators = 0;
        assert!(params.validate().is_err());

        let mut params = TrainingParams::new(ModelType::LogisticRegression);
        params.learning_rate = f64::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(10), 10);
    }
}
