//! Random forest classifier built from bootstrapped CART trees

use serde::{Deserialize, Serialize};

use super::tree::{CartBuilder, Tree, TreeConfig};
use crate::deterministic::LcgRng;
use crate::features::FeatureMatrix;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    pub trees: Vec<Tree>,
}

impl RandomForest {
    /// Train `n_estimators` trees, each on its own bootstrap sample
    ///
    /// Tree `t` draws rows and split features from a stream derived from
    /// `(random_state, t)`.
    pub fn fit(
        features: &FeatureMatrix,
        labels: &[u8],
        n_estimators: usize,
        config: TreeConfig,
        random_state: u64,
    ) -> Self {
        let n = features.n_rows();
        let builder = CartBuilder::new(&features.rows, labels, config);

        let trees = (0..n_estimators)
            .map(|tree_idx| {
                let mut rng = LcgRng::derive(random_state, tree_idx as u64);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.next_below(n)).collect();
                let tree = builder.build(&bootstrap, &mut rng);
                tracing::trace!(tree_idx, nodes = tree.nodes.len(), depth = tree.depth(), "built tree");
                tree
            })
            .collect();

        Self { trees }
    }

    /// Mean positive-class fraction over all trees
    pub fn probability(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.evaluate(row)).sum();
        sum / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.1;
            rows.push(vec![1.0 + jitter, 0.0]);
            labels.push(0);
            rows.push(vec![3.0 + jitter, 0.0]);
            labels.push(1);
        }
        (
            FeatureMatrix::new(vec!["x".into(), "noise".into()], rows).unwrap(),
            labels,
        )
    }

    #[test]
    fn test_forest_separates_blobs() {
        let (features, labels) = blobs();
        let forest = RandomForest::fit(&features, &labels, 10, TreeConfig::default(), 42);

        assert_eq!(forest.trees.len(), 10);
        assert!(forest.probability(&[3.2, 0.0]) > 0.5);
        assert!(forest.probability(&[1.1, 0.0]) < 0.5);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (features, labels) = blobs();
        let config = TreeConfig {
            max_features: 1,
            ..TreeConfig::default()
        };
        let a = RandomForest::fit(&features, &labels, 5, config.clone(), 7);
        let b = RandomForest::fit(&features, &labels, 5, config, 7);
        assert_eq!(a, b);
    }
}
