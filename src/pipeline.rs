/// Stage orchestration shared by the CLI and the integration tests:
/// fetch history to CSV, train and evaluate, and build (or load) the grid
/// severity table.

use std::fs;
use std::path::Path;

use crate::analysis::features::{prepare_training_set, FeatureSchema};
use crate::analysis::severity::{classify_grid_frame, read_severity_csv, write_severity_csv, SeverityRecord};
use crate::artifact::TrainedModel;
use crate::config::FlocastConfig;
use crate::dataset::{DailyFrame, JoinKind};
use crate::grid::{generate_grid, partition_batches, GridSpec};
use crate::ingest::client::WeatherApi;
use crate::ingest::daily::{fetch_daily_climate, fetch_daily_discharge, SiteSeries};
use crate::ingest::grid_batch::{fetch_grid_discharge, GridFetchParams, GridFetchReport};
use crate::logging::{self, DataSource};
use crate::model::FloodError;
use crate::training::{CrossValidation, Evaluation, Trainer};

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

pub struct HistoryFetch {
    pub climate: SiteSeries,
    pub discharge: SiteSeries,
}

/// Fetches the configured training period for both sites and writes the
/// two CSV caches the training stage reads.
pub fn fetch_history(api: &dyn WeatherApi, config: &FlocastConfig) -> Result<HistoryFetch, FloodError> {
    let t = &config.training;
    let climate = fetch_daily_climate(
        api,
        &config.api.climate_url,
        config.climate.coordinate(),
        config.climate.model.as_deref(),
        t.start_date,
        t.end_date,
    )?;
    let discharge = fetch_daily_discharge(
        api,
        &config.api.flood_url,
        config.discharge.coordinate(),
        config.discharge.model.as_deref(),
        t.start_date,
        t.end_date,
    )?;

    ensure_parent(&config.paths.climate_csv)?;
    climate.frame.write_csv(&config.paths.climate_csv)?;
    ensure_parent(&config.paths.discharge_csv)?;
    discharge.frame.write_csv(&config.paths.discharge_csv)?;
    logging::info(
        DataSource::System,
        None,
        &format!(
            "wrote {} and {}",
            config.paths.climate_csv.display(),
            config.paths.discharge_csv.display()
        ),
    );

    Ok(HistoryFetch { climate, discharge })
}

fn ensure_parent(path: &Path) -> Result<(), FloodError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Train
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TrainingRun {
    pub model: TrainedModel,
    pub evaluation: Evaluation,
    pub cross_validation: CrossValidation,
    /// Rows in the merged frame before feature extraction
    pub merged_rows: usize,
    /// Rows dropped for undefined features
    pub dropped_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub positives: usize,
}

/// Inner join on date: only days with both discharge and climate data.
pub fn merge_training_inputs(discharge: &DailyFrame, climate: &DailyFrame) -> DailyFrame {
    discharge.merge(climate, JoinKind::Inner)
}

/// Labels, splits, fits, cross-validates and evaluates.
pub fn train_model(
    discharge: &DailyFrame,
    climate: &DailyFrame,
    trainer: &Trainer,
    flood_quantile: f64,
) -> Result<TrainingRun, FloodError> {
    let merged = merge_training_inputs(discharge, climate);
    if merged.is_empty() {
        return Err(FloodError::NoDataAvailable(
            "discharge and climate series share no dates".to_string(),
        ));
    }

    let schema = FeatureSchema::flood_default();
    let set = prepare_training_set(&merged, &schema, flood_quantile)?;
    tracing::info!(
        rows = set.len(),
        dropped = set.features.dropped(),
        positives = set.positives(),
        threshold = set.flood_threshold,
        "training set prepared"
    );

    let outcome = trainer.fit(&set)?;
    let cross_validation = trainer.cross_validate(&set.features, &set.labels)?;
    let evaluation = trainer.evaluate(&outcome.model, &outcome.test)?;

    let train_rows = outcome.train.len();
    let test_rows = outcome.test.len();
    let model = TrainedModel::new(outcome.model, schema, set.flood_threshold)?;
    logging::info(
        DataSource::Model,
        None,
        &format!(
            "trained {} trees: hold-out accuracy {:.4}, cv mean {:.4} (std {:.4})",
            model.forest.n_trees(),
            evaluation.accuracy,
            cross_validation.mean,
            cross_validation.std
        ),
    );

    Ok(TrainingRun {
        model,
        evaluation,
        cross_validation,
        merged_rows: merged.len(),
        dropped_rows: set.features.dropped(),
        train_rows,
        test_rows,
        positives: set.positives(),
    })
}

// ---------------------------------------------------------------------------
// Grid severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum SeveritySource {
    /// Loaded from an existing severity CSV; no requests made.
    Cache,
    /// Fetched from the API and written to the severity CSV.
    Fetched { points: usize, report: GridFetchReport },
}

#[derive(Debug, Clone)]
pub struct GridRun {
    pub records: Vec<SeverityRecord>,
    pub source: SeveritySource,
}

/// Loads `cache_path` if it exists; otherwise fetches every grid batch,
/// classifies the rows and writes the cache.
///
/// A run where every batch failed writes nothing, so the next run retries.
pub fn load_or_build_severity(
    api: &dyn WeatherApi,
    flood_url: &str,
    spec: &GridSpec,
    batch_size: usize,
    params: &GridFetchParams,
    cache_path: &Path,
) -> Result<GridRun, FloodError> {
    if cache_path.exists() {
        let records = read_severity_csv(cache_path)?;
        tracing::info!(path = %cache_path.display(), rows = records.len(), "loaded severity cache");
        return Ok(GridRun {
            records,
            source: SeveritySource::Cache,
        });
    }

    let points = generate_grid(spec)?;
    let batches = partition_batches(&points, batch_size)?;
    tracing::info!(points = points.len(), batches = batches.len(), "grid generated");

    let fetch = fetch_grid_discharge(api, flood_url, &batches, params)?;
    if fetch.report.all_failed() {
        return Err(FloodError::NoDataAvailable(format!(
            "all {} grid batches failed",
            fetch.report.batches_total
        )));
    }

    let records = classify_grid_frame(&fetch.frame)?;
    ensure_parent(cache_path)?;
    write_severity_csv(cache_path, &records)?;
    logging::info(
        DataSource::System,
        None,
        &format!("wrote {} severity rows to {}", records.len(), cache_path.display()),
    );

    Ok(GridRun {
        records,
        source: SeveritySource::Fetched {
            points: points.len(),
            report: fetch.report,
        },
    })
}
