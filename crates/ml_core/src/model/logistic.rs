//! L2-regularised logistic regression trained with full-batch gradient descent

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::FeatureMatrix;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
    /// Iterations actually run before convergence or `max_iter`
    pub iterations: usize,
}

/// Numerically stable logistic function
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticRegression {
    /// Fit from zero weights; deterministic for fixed inputs
    pub fn fit(
        features: &FeatureMatrix,
        labels: &[u8],
        learning_rate: f64,
        l2_penalty: f64,
        max_iter: usize,
        tolerance: f64,
    ) -> Self {
        let n = features.n_rows() as f64;
        let d = features.n_features();
        let mut weights = vec![0.0; d];
        let mut intercept = 0.0;
        let mut iterations = 0;

        for _ in 0..max_iter {
            iterations += 1;

            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;
            for (row, &label) in features.rows.iter().zip(labels) {
                let error = sigmoid(dot(&weights, row) + intercept) - f64::from(label);
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += error * x;
                }
                grad_b += error;
            }

            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + l2_penalty * w;
            }
            grad_b /= n;

            let norm = (grad_w.iter().map(|g| g * g).sum::<f64>() + grad_b * grad_b).sqrt();
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g;
            }
            intercept -= learning_rate * grad_b;

            if norm < tolerance {
                break;
            }
        }

        debug!(iterations, "logistic regression fitted");
        Self {
            weights,
            intercept,
            iterations,
        }
    }

    /// Probability of the positive class for one row
    pub fn probability(&self, row: &[f64]) -> f64 {
        sigmoid(dot(&self.weights, row) + self.intercept)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
