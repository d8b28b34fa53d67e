//! Evaluation metrics for binary classifiers
//!
//! Metrics are a flat name → value map, serialized as a JSON object.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{PipelineError, Result};
use crate::model::DECISION_THRESHOLD;

/// Metric name → scalar value, ordered by name
pub type Metrics = BTreeMap<String, f64>;

pub const ACCURACY: &str = "accuracy";
pub const ROC_AUC: &str = "roc_auc";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const F1: &str = "f1";

/// Compute metrics from positive-class probabilities and true labels
pub fn evaluate_model(probabilities: &[f64], labels: &[u8]) -> Result<Metrics> {
    if probabilities.len() != labels.len() {
        return Err(PipelineError::config(format!(
            "{} probabilities for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Err(PipelineError::config("cannot evaluate on an empty set"));
    }
    if let Some(p) = probabilities.iter().find(|p| !p.is_finite()) {
        return Err(PipelineError::config(format!("probability {} is not finite", p)));
    }

    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (&p, &label) in probabilities.iter().zip(labels) {
        match (p >= DECISION_THRESHOLD, label == 1) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    let mut metrics = Metrics::new();
    metrics.insert(ACCURACY.into(), ratio(tp + tn, labels.len()));
    metrics.insert(ROC_AUC.into(), roc_auc(probabilities, labels)?);
    metrics.insert(PRECISION.into(), precision);
    metrics.insert(RECALL.into(), recall);
    metrics.insert(F1.into(), f1);
    Ok(metrics)
}

/// Area under the ROC curve via the Mann–Whitney rank statistic
///
/// Tied scores share their average rank.
pub fn roc_auc(scores: &[f64], labels: &[u8]) -> Result<f64> {
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(PipelineError::config(
            "ROC AUC is undefined when only one class is present",
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        pos_rank_sum += avg_rank * order[start..end].iter().filter(|&&i| labels[i] == 1).count() as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Write metrics as a flat JSON object, overwriting any existing file
pub fn write_metrics<P: AsRef<Path>>(metrics: &Metrics, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| PipelineError::file(parent, err))?;
    }
    let json = serde_json::to_string_pretty(metrics)?;
    fs::write(path, json).map_err(|err| PipelineError::file(path, err))
}

pub fn read_metrics<P: AsRef<Path>>(path: P) -> Result<Metrics> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|err| PipelineError::file(path, err))?;
    Ok(serde_json::from_str(&json)?)
}
