/// flocast: river flood prediction from Open-Meteo climate and discharge data.
///
/// # Module structure
///
/// ```text
/// flocast
/// ├── model       : shared types (Coordinate, FloodSeverity, FloodError, variable names)
/// ├── config      : pipeline configuration loader (flocast.toml)
/// ├── logging     : tracing setup, source tags, fetch failure classification
/// ├── dataset     : DailyFrame, the date(+location)-keyed table with merge/ffill/CSV
/// ├── grid        : coordinate grid around a center point + batch partitioning
/// ├── ingest
/// │   ├── open_meteo : URL construction + JSON parsing
/// │   ├── client     : WeatherApi trait, retrying + caching HTTP client
/// │   ├── daily      : single-site climate and discharge fetchers
/// │   ├── grid_batch : batched grid discharge fetch, failed batches skipped
/// │   └── fixtures (test only) : representative API response payloads
/// ├── analysis
/// │   ├── labels   : quantile flood threshold + flood_occurred labels
/// │   ├── severity : fixed-threshold flood severity + severity CSV
/// │   └── features : feature schema, rolling mean, feature matrix
/// ├── forest      : CART trees and the random forest ensemble
/// ├── training    : split, fit, k-fold cross-validation, evaluation report
/// ├── artifact    : persisted model (forest + feature schema)
/// ├── predictor   : forecast window, row-wise prediction, monthly aggregation
/// └── pipeline    : fetch / train / grid stages used by the CLI
/// ```

/// Public modules
pub mod analysis;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod forest;
pub mod grid;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod training;
