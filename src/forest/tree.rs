/// Binary classification tree (CART, Gini impurity).
///
/// Nodes live in a flat arena so that deep trees serialize without
/// recursion and prediction is a simple loop.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth (None = grow until pure or too small to split)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all)
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Fraction of flood-positive samples that reached this leaf
        probability: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        /// Samples with `x[feature] <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    weighted_impurity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    nodes: Vec<Node>,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Grows the tree on the rows named by `sample` (which may repeat, for
    /// bootstrap samples). Importances are normalized to sum to 1 unless
    /// the tree never split.
    pub fn fit(&mut self, rows: &[Vec<f64>], labels: &[bool], sample: &[usize], rng: &mut ChaCha8Rng) {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        self.nodes.clear();
        self.feature_importances = vec![0.0; n_features];

        if sample.is_empty() {
            self.nodes.push(Node::Leaf {
                probability: 0.0,
                n_samples: 0,
            });
            return;
        }

        self.build(rows, labels, sample.to_vec(), 0, rng);

        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }
    }

    fn build(
        &mut self,
        rows: &[Vec<f64>],
        labels: &[bool],
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| labels[i]).count();
        let impurity = gini(positives, n);
        let leaf = Node::Leaf {
            probability: positives as f64 / n as f64,
            n_samples: n,
        };

        let depth_exhausted = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_exhausted || n < self.config.min_samples_split || impurity <= 0.0 {
            self.nodes.push(leaf);
            return self.nodes.len() - 1;
        }

        let Some(split) = self.find_best_split(rows, labels, &indices, impurity, rng) else {
            self.nodes.push(leaf);
            return self.nodes.len() - 1;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| rows[i][split.feature] <= split.threshold);

        // Mean decrease in impurity, weighted by node size
        self.feature_importances[split.feature] += n as f64 * (impurity - split.weighted_impurity);

        let idx = self.nodes.len();
        self.nodes.push(leaf);
        let left = self.build(rows, labels, left_indices, depth + 1, rng);
        let right = self.build(rows, labels, right_indices, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples: n,
        };
        idx
    }

    /// Sorted sweep over each candidate feature: O(n log n) per feature.
    fn find_best_split(
        &self,
        rows: &[Vec<f64>],
        labels: &[bool],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = self.feature_importances.len();
        let max_features = self.config.max_features.unwrap_or(n_features).clamp(1, n_features.max(1));

        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);
        features.truncate(max_features);

        let n = indices.len();
        let total_pos = indices.iter().filter(|&&i| labels[i]).count();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        for feature in features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

            let mut left_pos = 0usize;
            for i in 0..n - 1 {
                if labels[sorted[i]] {
                    left_pos += 1;
                }
                let lo = rows[sorted[i]][feature];
                let hi = rows[sorted[i + 1]][feature];
                if lo >= hi {
                    continue;
                }
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * gini(left_pos, n_left)
                    + n_right as f64 * gini(total_pos - left_pos, n_right))
                    / n as f64;

                let improves = match &best {
                    Some(b) => weighted < b.weighted_impurity,
                    None => weighted < parent_impurity,
                };
                if improves {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        weighted_impurity: weighted,
                    });
                }
            }
        }

        best
    }

    /// Flood probability for one feature row.
    pub fn predict_proba_one(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { probability, .. }) => return *probability,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                }) => {
                    idx = if features[*feature] <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}

/// Draws `n` row indices with replacement.
pub fn bootstrap_indices(n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn step_data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64 / 10.0, (i % 7) as f64]).collect();
        let labels = rows.iter().map(|r| r[0] > 5.0).collect();
        (rows, labels)
    }

    #[test]
    fn test_tree_learns_single_threshold() {
        let (rows, labels) = step_data();
        let sample: Vec<usize> = (0..rows.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&rows, &labels, &sample, &mut rng);

        for (row, &label) in rows.iter().zip(&labels) {
            assert_eq!(tree.predict_proba_one(row) > 0.5, label);
        }
        assert_eq!(tree.depth(), 2, "one split separates the classes");
        assert_eq!(tree.feature_importances(), &[1.0, 0.0]);
    }

    #[test]
    fn test_pure_sample_is_a_single_leaf() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![false, false, false];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&rows, &labels, &[0, 1, 2], &mut rng);

        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_proba_one(&[10.0]), 0.0);
        assert_eq!(tree.feature_importances(), &[0.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let (rows, _) = step_data();
        // alternating labels need many splits
        let labels: Vec<bool> = (0..rows.len()).map(|i| i % 2 == 0).collect();
        let sample: Vec<usize> = (0..rows.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut tree = DecisionTree::new(TreeConfig {
            max_depth: Some(3),
            ..Default::default()
        });
        tree.fit(&rows, &labels, &sample, &mut rng);
        assert!(tree.depth() <= 4);
    }

    #[test]
    fn test_constant_features_cannot_split() {
        let rows = vec![vec![1.0]; 6];
        let labels = vec![true, false, true, false, true, false];
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&rows, &labels, &[0, 1, 2, 3, 4, 5], &mut rng);

        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict_proba_one(&[1.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_bootstrap_indices_in_range_and_seeded() {
        let a = bootstrap_indices(50, &mut ChaCha8Rng::seed_from_u64(42));
        let b = bootstrap_indices(50, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.iter().all(|&i| i < 50));
        assert!(bootstrap_indices(0, &mut ChaCha8Rng::seed_from_u64(42)).is_empty());
    }

    #[test]
    fn test_tree_serde_round_trip() {
        let (rows, labels) = step_data();
        let sample: Vec<usize> = (0..rows.len()).collect();
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&rows, &labels, &sample, &mut ChaCha8Rng::seed_from_u64(42));

        let json = serde_json::to_string(&tree).unwrap();
        let back: DecisionTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
