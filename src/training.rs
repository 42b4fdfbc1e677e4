/// Train/test split, forest fitting, k-fold cross-validation and hold-out
/// evaluation.
///
/// The same seed drives the split shuffle and the fold shuffle, so results
/// are reproducible for identical input ordering.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::features::{FeatureMatrix, LabeledSet};
use crate::forest::{ForestConfig, RandomForest};
use crate::model::FloodError;

/// Smallest dataset the hold-out split accepts.
pub const MIN_SPLIT_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Fraction of rows held out for testing
    pub test_ratio: f64,
    /// Cross-validation fold count
    pub folds: usize,
    /// Seed for the split and fold shuffles
    pub seed: u64,
    pub forest: ForestConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            folds: 5,
            seed: 42,
            forest: ForestConfig::default(),
        }
    }
}

/// Row indices of each side of a hold-out split.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled split with `ceil(test_ratio * n)` test rows.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Result<Split, FloodError> {
    if n < MIN_SPLIT_ROWS {
        return Err(FloodError::InsufficientData {
            operation: "train/test split",
            required: MIN_SPLIT_ROWS,
            available: n,
        });
    }
    let n_test = (test_ratio * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(FloodError::Config(format!(
            "test ratio {} leaves an empty side for {} rows",
            test_ratio, n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(Split { train, test: indices })
}

/// Validation indices of each of `k` shuffled folds. The first `n % k`
/// folds hold one extra row.
pub fn kfold_indices(n: usize, k: usize, seed: u64) -> Result<Vec<Vec<usize>>, FloodError> {
    if k < 2 {
        return Err(FloodError::Config(format!("cross-validation needs at least 2 folds, got {}", k)));
    }
    if n < k {
        return Err(FloodError::InsufficientData {
            operation: "k-fold cross-validation",
            required: k,
            available: n,
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        folds.push(indices[start..start + size].to_vec());
        start += size;
    }
    Ok(folds)
}

/// A fitted forest with the data it was (and was not) trained on.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: RandomForest,
    pub split: Split,
    pub train: LabeledSet,
    pub test: LabeledSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidation {
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CrossValidation {
    /// Summarizes fold scores; `std` is the population standard deviation.
    pub fn from_scores(scores: Vec<f64>) -> Self {
        if scores.is_empty() {
            return CrossValidation {
                scores,
                mean: 0.0,
                std: 0.0,
            };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        CrossValidation {
            scores,
            mean,
            std: variance.sqrt(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(actual: &[bool], predicted: &[bool]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (a, p) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }
}

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: &'static str,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn new(label: &'static str, hits: usize, predicted: usize, support: usize) -> Self {
        let precision = ratio(hits, predicted);
        let recall = ratio(hits, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            label,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Per-class report plus macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = ClassMetrics::new("no flood", cm.tn, cm.tn + cm.fn_, cm.tn + cm.fp);
        let positive = ClassMetrics::new("flood", cm.tp, cm.tp + cm.fp, cm.tp + cm.fn_);
        let classes = vec![negative, positive];
        let total = cm.total();

        let average = |label, weight: &dyn Fn(&ClassMetrics) -> f64| {
            let weights: f64 = classes.iter().map(weight).sum();
            let mean = |f: fn(&ClassMetrics) -> f64| {
                if weights > 0.0 {
                    classes.iter().map(|c| f(c) * weight(c)).sum::<f64>() / weights
                } else {
                    0.0
                }
            };
            ClassMetrics {
                label,
                precision: mean(|c| c.precision),
                recall: mean(|c| c.recall),
                f1: mean(|c| c.f1),
                support: total,
            }
        };

        let macro_avg = average("macro avg", &|_| 1.0);
        let weighted_avg = average("weighted avg", &|c| c.support as f64);

        ClassificationReport {
            classes,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for c in [&self.macro_avg, &self.weighted_avg] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    /// Feature importances, least important first.
    pub feature_ranking: Vec<(String, f64)>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Trainer { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Splits the labeled set and fits a forest on the training side.
    pub fn fit(&self, data: &LabeledSet) -> Result<FitOutcome, FloodError> {
        let split = train_test_split(data.len(), self.config.test_ratio, self.config.seed)?;
        let train = data.subset(&split.train);
        let test = data.subset(&split.test);

        let mut model = RandomForest::new(self.config.forest.clone());
        model.fit(&train.features, &train.labels)?;

        tracing::info!(
            train_rows = train.len(),
            test_rows = test.len(),
            positives = train.positives(),
            trees = model.n_trees(),
            "fitted random forest"
        );

        Ok(FitOutcome {
            model,
            split,
            train,
            test,
        })
    }

    /// Per-fold accuracy of a fresh forest (same configuration) trained on
    /// the remaining folds.
    pub fn cross_validate(&self, features: &FeatureMatrix, labels: &[bool]) -> Result<CrossValidation, FloodError> {
        if features.len() != labels.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let folds = kfold_indices(features.len(), self.config.folds, self.config.seed)?;

        let mut scores = Vec::with_capacity(folds.len());
        for (i, validation) in folds.iter().enumerate() {
            let train: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();

            let train_labels: Vec<bool> = train.iter().map(|&r| labels[r]).collect();
            let mut model = RandomForest::new(self.config.forest.clone());
            model.fit(&features.subset(&train), &train_labels)?;

            let validation_features = features.subset(validation);
            let predicted = model.predict(validation_features.rows())?;
            let actual: Vec<bool> = validation.iter().map(|&r| labels[r]).collect();
            let score = ConfusionMatrix::from_predictions(&actual, &predicted).accuracy();

            tracing::debug!(fold = i + 1, score, "cross-validation fold scored");
            scores.push(score);
        }

        Ok(CrossValidation::from_scores(scores))
    }

    /// Hold-out accuracy, per-class report and ascending importance ranking.
    pub fn evaluate(&self, model: &RandomForest, test: &LabeledSet) -> Result<Evaluation, FloodError> {
        if test.is_empty() {
            return Err(FloodError::InsufficientData {
                operation: "evaluation",
                required: 1,
                available: 0,
            });
        }
        let predicted = model.predict(test.features.rows())?;
        let confusion = ConfusionMatrix::from_predictions(&test.labels, &predicted);
        let report = ClassificationReport::from_confusion(&confusion);

        Ok(Evaluation {
            accuracy: confusion.accuracy(),
            confusion,
            report,
            feature_ranking: model.feature_importance_ranking(),
        })
    }
}
