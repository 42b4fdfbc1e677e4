/// Random forest classifier: CART trees grown on bootstrap samples and
/// averaged into a flood probability.

pub mod ensemble;
pub mod tree;

pub use ensemble::{ForestConfig, RandomForest};
pub use tree::{DecisionTree, TreeConfig};
