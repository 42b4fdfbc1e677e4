/// Random forest classifier for flood / no-flood.
///
/// Trees are grown sequentially, each on its own bootstrap sample with its
/// own seeded RNG, so a given seed and input ordering always reproduce the
/// same forest.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{bootstrap_indices, DecisionTree, TreeConfig};
use crate::analysis::features::FeatureMatrix;
use crate::model::FloodError;

/// Random forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree (None = unlimited)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features per split (floor(sqrt(n_features)), at least 1, if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_names: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train the forest on a feature matrix and its labels.
    pub fn fit(&mut self, features: &FeatureMatrix, labels: &[bool]) -> Result<(), FloodError> {
        if features.len() != labels.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if features.is_empty() {
            return Err(FloodError::InsufficientData {
                operation: "random forest fit",
                required: 1,
                available: 0,
            });
        }

        self.feature_names = features.columns().to_vec();
        let n_features = features.n_features();
        let n_samples = features.len();
        let rows = features.rows();

        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| default_max_features(n_features))
            .max(1);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(max_features),
        };

        self.trees = (0..self.config.n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let sample = if self.config.bootstrap {
                    bootstrap_indices(n_samples, &mut rng)
                } else {
                    (0..n_samples).collect()
                };
                let mut tree = DecisionTree::new(tree_config.clone());
                tree.fit(rows, labels, &sample, &mut rng);
                tree
            })
            .collect();

        // Aggregate feature importances
        self.feature_importances = vec![0.0; n_features];
        for tree in &self.trees {
            for (total, &imp) in self.feature_importances.iter_mut().zip(tree.feature_importances()) {
                *total += imp;
            }
        }

        // Normalize
        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }

        Ok(())
    }

    /// Mean flood probability across trees.
    pub fn predict_proba_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_proba_one(features)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict_one(&self, features: &[f64]) -> bool {
        self.predict_proba_one(features) > 0.5
    }

    /// Flood probability per row. Rows must have `n_features` values.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, FloodError> {
        self.check_width(rows)?;
        Ok(rows.iter().map(|r| self.predict_proba_one(r)).collect())
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<bool>, FloodError> {
        self.check_width(rows)?;
        Ok(rows.iter().map(|r| self.predict_one(r)).collect())
    }

    fn check_width(&self, rows: &[Vec<f64>]) -> Result<(), FloodError> {
        match rows.iter().find(|r| r.len() != self.feature_names.len()) {
            Some(bad) => Err(FloodError::ShapeMismatch(format!(
                "row has {} features, forest was fit on {}",
                bad.len(),
                self.feature_names.len()
            ))),
            None => Ok(()),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Feature names with importances, least important first.
    pub fn feature_importance_ranking(&self) -> Vec<(String, f64)> {
        let mut ranking: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.feature_importances.iter().copied())
            .collect();
        ranking.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranking
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Print summary
    pub fn summary(&self) {
        println!("Random Forest Summary");
        println!("=====================");
        println!("Number of trees: {}", self.n_trees());
        match self.config.max_depth {
            Some(depth) => println!("Max depth: {}", depth),
            None => println!("Max depth: unlimited"),
        }
        let deepest = self.trees.iter().map(|t| t.depth()).max().unwrap_or(0);
        println!("Deepest tree: {} levels", deepest);

        println!("\nFeature Importances (most important first):");
        for (name, importance) in self.feature_importance_ranking().iter().rev() {
            println!("  {:<32} {:.4}", name, importance);
        }
    }
}

/// Square-root rule, rounded down.
pub fn default_max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}
