/// Labeling and feature engineering for the flood classifier.
///
/// Submodules:
/// - `labels`: quantile flood threshold and `flood_occurred` labels.
/// - `severity`: fixed-threshold severity for grid forecasts + its CSV.
/// - `features`: feature schema, rolling mean, feature matrix extraction.

pub mod features;
pub mod labels;
pub mod severity;
