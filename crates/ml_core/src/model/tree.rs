//! CART (Classification and Regression Tree) builder
//!
//! Deterministic exact-greedy classification trees with Gini impurity.
//! Leaves store the fraction of positive samples that reached them.

use serde::{Deserialize, Serialize};

use crate::deterministic::{LcgRng, SplitTieBreaker};

/// A decision tree node (internal or leaf)
///
/// Internal nodes have `feature_idx >= 0` and valid child indices; leaves
/// have `feature_idx == -1` and carry `leaf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub left: i32,
    pub right: i32,
    pub feature_idx: i32,
    pub threshold: f64,
    pub leaf: Option<f64>,
}

impl Node {
    pub fn internal(feature_idx: usize, threshold: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: feature_idx as i32,
            threshold,
            leaf: None,
        }
    }

    pub fn leaf(value: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single decision tree (node 0 is the root)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Evaluate this tree on a feature vector
    ///
    /// Goes left when `feature <= threshold`. Malformed trees evaluate to 0.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Structural check used when loading persisted models
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= n_features {
                return Err(format!("node {} splits on unknown feature {}", i, node.feature_idx));
            }
            for child in [node.left, node.right] {
                // children are always pushed after their parent
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("node {} has invalid child {}", i, child));
                }
            }
        }
        Ok(())
    }

    /// Length of the longest root-to-leaf path, counted in splits
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match self.nodes.get(idx) {
                Some(node) if !node.is_leaf() => {
                    for child in [node.left, node.right] {
                        if child > idx as i32 {
                            stack.push((child as usize, depth + 1));
                        }
                    }
                }
                _ => deepest = deepest.max(depth),
            }
        }
        deepest
    }
}

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered at each split
    pub max_features: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_samples_leaf: 1,
            max_features: usize::MAX,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// A node still waiting to be built: its samples, depth and the parent slot
/// it hangs from
struct PendingNode {
    indices: Vec<usize>,
    depth: usize,
    parent: Option<(usize, bool)>,
}

/// Build a classification tree using the exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    labels: &'a [u8],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(features: &'a [Vec<f64>], labels: &'a [u8], config: TreeConfig) -> Self {
        let feature_count = features.first().map(Vec::len).unwrap_or(0);
        Self {
            config,
            features,
            labels,
            feature_count,
        }
    }

    /// Build a tree over the given sample indices (duplicates allowed for
    /// bootstrap samples)
    ///
    /// Nodes are laid out in pre-order (parent, left subtree, right subtree).
    /// An explicit work stack keeps deep trees off the call stack.
    pub fn build(&self, indices: &[usize], rng: &mut LcgRng) -> Tree {
        let mut nodes: Vec<Node> = Vec::new();
        let mut pending = vec![PendingNode {
            indices: indices.to_vec(),
            depth: 0,
            parent: None,
        }];

        while let Some(PendingNode {
            indices,
            depth,
            parent,
        }) = pending.pop()
        {
            let current_idx = nodes.len();
            if let Some((parent_idx, is_left)) = parent {
                let link = current_idx as i32;
                if is_left {
                    nodes[parent_idx].left = link;
                } else {
                    nodes[parent_idx].right = link;
                }
            }

            let positives = self.count_positives(&indices);
            let leaf_value = if indices.is_empty() {
                0.0
            } else {
                positives as f64 / indices.len() as f64
            };

            // Check stopping conditions
            if depth >= self.config.max_depth
                || indices.len() < 2 * self.config.min_samples_leaf
                || positives == 0
                || positives == indices.len()
            {
                nodes.push(Node::leaf(leaf_value));
                continue;
            }

            let Some(split) = self.find_best_split(&indices, positives, rng) else {
                nodes.push(Node::leaf(leaf_value));
                continue;
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| self.features[i][split.feature_idx] <= split.threshold);

            nodes.push(Node::internal(split.feature_idx, split.threshold));

            // right is pushed first so the left subtree is built first
            pending.push(PendingNode {
                indices: right_indices,
                depth: depth + 1,
                parent: Some((current_idx, false)),
            });
            pending.push(PendingNode {
                indices: left_indices,
                depth: depth + 1,
                parent: Some((current_idx, true)),
            });
        }

        Tree { nodes }
    }

    /// Features examined at a node, a seeded subset when `max_features` is
    /// smaller than the feature count
    fn candidate_features(&self, rng: &mut LcgRng) -> Vec<usize> {
        if self.config.max_features >= self.feature_count {
            (0..self.feature_count).collect()
        } else {
            rng.sample_indices(self.feature_count, self.config.max_features.max(1))
        }
    }

    /// Find the split with the largest impurity decrease
    ///
    /// Each candidate feature is swept once in sorted order; thresholds are
    /// midpoints between consecutive distinct values.
    fn find_best_split(
        &self,
        indices: &[usize],
        positives: usize,
        rng: &mut LcgRng,
    ) -> Option<SplitCandidate> {
        let total = indices.len();
        let parent_impurity = gini(positives, total) * total as f64;
        let min_leaf = self.config.min_samples_leaf;
        let mut best_split: Option<SplitCandidate> = None;

        for feature_idx in self.candidate_features(rng) {
            let mut sorted: Vec<(f64, u8)> = indices
                .iter()
                .map(|&i| (self.features[i][feature_idx], self.labels[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0usize;
            let mut rank = 0usize;
            for k in 1..total {
                left_pos += sorted[k - 1].1 as usize;
                if sorted[k - 1].0 == sorted[k].0 {
                    continue;
                }
                rank += 1;

                let left_n = k;
                let right_n = total - k;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let children = gini(left_pos, left_n) * left_n as f64
                    + gini(positives - left_pos, right_n) * right_n as f64;
                let gain = parent_impurity - children;
                if gain <= 1e-12 {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature_idx,
                    threshold: (sorted[k - 1].0 + sorted[k].0) / 2.0,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, rank),
                };

                if best_split.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best_split = Some(candidate);
                }
            }
        }

        best_split
    }

    fn count_positives(&self, indices: &[usize]) -> usize {
        indices.iter().filter(|&&i| self.labels[i] == 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_separable_tree() {
        let features = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0], vec![4.0, 5.0]];
        let labels = vec![0, 0, 1, 1];

        let builder = CartBuilder::new(&features, &labels, TreeConfig::default());
        let tree = builder.build(&all(4), &mut LcgRng::new(0));

        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].feature_idx, 0);
        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert_eq!(tree.evaluate(&[1.5, 0.0]), 0.0);
        assert_eq!(tree.evaluate(&[3.5, 0.0]), 1.0);
        assert!(tree.validate(2).is_ok());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let features = vec![vec![1.0], vec![2.0]];
        let labels = vec![1, 1];

        let builder = CartBuilder::new(&features, &labels, TreeConfig::default());
        let tree = builder.build(&all(2), &mut LcgRng::new(0));

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf, Some(1.0));
    }

    #[test]
    fn test_max_depth_respected() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..16).map(|i| (i % 2) as u8).collect();
        let config = TreeConfig {
            max_depth: 2,
            ..TreeConfig::default()
        };

        let tree = CartBuilder::new(&features, &labels, config).build(&all(16), &mut LcgRng::new(0));
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let labels = vec![0, 1, 1, 1];
        let config = TreeConfig {
            min_samples_leaf: 2,
            ..TreeConfig::default()
        };

        let tree = CartBuilder::new(&features, &labels, config).build(&all(4), &mut LcgRng::new(0));
        // the only pure split (1 | 3) would leave a single-sample leaf
        assert_eq!(tree.nodes[0].threshold, 2.5);
    }

    #[test]
    fn test_build_is_deterministic() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i * 7 % 13) as f64, (i * 3 % 5) as f64, i as f64])
            .collect();
        let labels: Vec<u8> = (0..40).map(|i| ((i * 7 % 13) > 6) as u8).collect();
        let config = TreeConfig {
            max_features: 2,
            ..TreeConfig::default()
        };

        let a = CartBuilder::new(&features, &labels, config.clone()).build(&all(40), &mut LcgRng::new(9));
        let b = CartBuilder::new(&features, &labels, config).build(&all(40), &mut LcgRng::new(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_deep_tree_builds() {
        // alternating labels along a single feature force one split per level
        let features: Vec<Vec<f64>> = (0..200).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..200).map(|i| (i % 2) as u8).collect();
        let config = TreeConfig {
            max_depth: 500,
            ..TreeConfig::default()
        };

        let tree = CartBuilder::new(&features, &labels, config).build(&all(200), &mut LcgRng::new(0));

        assert!(tree.depth() > 64, "depth {}", tree.depth());
        assert!(tree.validate(1).is_ok());
        for (i, row) in features.iter().enumerate() {
            assert_eq!(tree.evaluate(row), labels[i] as f64);
        }
    }

    #[test]
    fn test_invalid_tree_rejected() {
        let tree = Tree {
            nodes: vec![Node {
                left: 5,
                right: 6,
                feature_idx: 0,
                threshold: 1.0,
                leaf: None,
            }],
        };
        assert!(tree.validate(1).is_err());
        assert_eq!(tree.evaluate(&[0.0]), 0.0);
    }
}
