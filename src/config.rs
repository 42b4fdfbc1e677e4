/// Pipeline configuration loader - parses flocast.toml
///
/// Keeps sites, date ranges, model hyperparameters and artifact paths out of
/// the code, so a different river or training period needs no recompile.
/// Every field has a default; a missing `flocast.toml` means "all defaults".

use chrono::NaiveDate;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::forest::ForestConfig;
use crate::grid::{GridSpec, DEFAULT_STEP_DEGREES};
use crate::ingest::client::RetryPolicy;
use crate::ingest::grid_batch::GridFetchParams;
use crate::model::{Coordinate, FloodError};
use crate::predictor::{ForecastSources, DEFAULT_HORIZON_DAYS};
use crate::training::TrainerConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "FLOCAST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "flocast.toml";

pub const CLIMATE_API_URL: &str = "https://climate-api.open-meteo.com/v1/climate";
pub const FLOOD_API_URL: &str = "https://flood-api.open-meteo.com/v1/flood";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Open-Meteo endpoints and HTTP behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub climate_url: String,
    pub flood_url: String,
    pub retry_attempts: u32,
    pub backoff_factor: f64,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            climate_url: CLIMATE_API_URL.to_string(),
            flood_url: FLOOD_API_URL.to_string(),
            retry_attempts: 5,
            backoff_factor: 0.2,
            cache_ttl_secs: 3600,
            timeout_secs: 60,
        }
    }
}

/// A single fetch site and the provider model to query there
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub model: Option<String>,
}

impl SiteConfig {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    fn default_climate() -> Self {
        SiteConfig {
            latitude: 12.5776539,
            longitude: 106.9349172,
            model: Some("MRI_AGCM3_2_S".to_string()),
        }
    }

    fn default_discharge() -> Self {
        SiteConfig {
            latitude: 12.59,
            longitude: 106.89,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// First day of the historical series fetched for training
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub flood_quantile: f64,
    pub test_ratio: f64,
    pub folds: usize,
    pub seed: u64,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            start_date: date(2000, 1, 1),
            end_date: date(2023, 12, 31),
            flood_quantile: 0.95,
            test_ratio: 0.2,
            folds: 5,
            seed: 42,
            n_trees: 100,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub horizon_days: i64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub half_extent_km: f64,
    pub step_degrees: f64,
    pub batch_size: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub model: Option<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            center_latitude: 20.112261,
            center_longitude: 77.757988,
            half_extent_km: 2.0,
            step_degrees: DEFAULT_STEP_DEGREES,
            batch_size: 5,
            start_date: date(2024, 5, 31),
            end_date: date(2024, 9, 30),
            model: Some("forecast_v4".to_string()),
        }
    }
}

/// Artifact locations, relative to the working directory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub climate_csv: PathBuf,
    pub discharge_csv: PathBuf,
    pub model: PathBuf,
    pub severity_csv: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            climate_csv: PathBuf::from("models/climate_model_data.csv"),
            discharge_csv: PathBuf::from("models/river_discharge.csv"),
            model: PathBuf::from("models/trained_model.json"),
            severity_csv: PathBuf::from("forecast_river_discharge_flood_severity.csv"),
            log_file: None,
        }
    }
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlocastConfig {
    pub api: ApiConfig,
    pub climate: SiteConfig,
    pub discharge: SiteConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub grid: GridConfig,
    pub paths: PathsConfig,
}

impl Default for FlocastConfig {
    fn default() -> Self {
        FlocastConfig {
            api: ApiConfig::default(),
            climate: SiteConfig::default_climate(),
            discharge: SiteConfig::default_discharge(),
            training: TrainingConfig::default(),
            prediction: PredictionConfig::default(),
            grid: GridConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl FlocastConfig {
    /// Loads the file named by `FLOCAST_CONFIG`, else `flocast.toml` in the
    /// working directory, else the defaults.
    ///
    /// An explicitly named file that does not exist is an error; a missing
    /// default file is not.
    pub fn load() -> Result<Self, FloodError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load_from(Path::new(DEFAULT_CONFIG_PATH)),
            Err(_) => {
                tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, FloodError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| FloodError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&contents, &path.display().to_string())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, FloodError> {
        Self::parse(contents, "config")
    }

    fn parse(contents: &str, origin: &str) -> Result<Self, FloodError> {
        let config: FlocastConfig = toml::from_str(contents)
            .map_err(|e| FloodError::Config(format!("Failed to parse {}: {}", origin, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no stage could run with.
    pub fn validate(&self) -> Result<(), FloodError> {
        let t = &self.training;
        if !(t.test_ratio > 0.0 && t.test_ratio < 1.0) {
            return Err(FloodError::Config(format!("training.test_ratio must be in (0, 1), got {}", t.test_ratio)));
        }
        if !(0.0..=1.0).contains(&t.flood_quantile) {
            return Err(FloodError::Config(format!(
                "training.flood_quantile must be in [0, 1], got {}",
                t.flood_quantile
            )));
        }
        if t.folds < 2 {
            return Err(FloodError::Config(format!("training.folds must be at least 2, got {}", t.folds)));
        }
        if t.n_trees == 0 {
            return Err(FloodError::Config("training.n_trees must be at least 1".to_string()));
        }
        if t.start_date > t.end_date {
            return Err(FloodError::Config("training.start_date is after training.end_date".to_string()));
        }

        let g = &self.grid;
        if g.batch_size == 0 {
            return Err(FloodError::Config("grid.batch_size must be at least 1".to_string()));
        }
        if !(g.step_degrees > 0.0) {
            return Err(FloodError::Config(format!("grid.step_degrees must be positive, got {}", g.step_degrees)));
        }
        if g.start_date > g.end_date {
            return Err(FloodError::Config("grid.start_date is after grid.end_date".to_string()));
        }

        if self.prediction.horizon_days < 0 {
            return Err(FloodError::Config("prediction.horizon_days must not be negative".to_string()));
        }
        if self.api.retry_attempts == 0 {
            return Err(FloodError::Config("api.retry_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.api.retry_attempts,
            backoff_factor: self.api.backoff_factor,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.api.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        let t = &self.training;
        TrainerConfig {
            test_ratio: t.test_ratio,
            folds: t.folds,
            seed: t.seed,
            forest: ForestConfig {
                n_trees: t.n_trees,
                max_depth: t.max_depth,
                seed: t.seed,
                ..Default::default()
            },
        }
    }

    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            center: Coordinate::new(self.grid.center_latitude, self.grid.center_longitude),
            half_extent_km: self.grid.half_extent_km,
            step_degrees: self.grid.step_degrees,
        }
    }

    pub fn grid_fetch_params(&self) -> GridFetchParams {
        GridFetchParams {
            start_date: self.grid.start_date,
            end_date: self.grid.end_date,
            model: self.grid.model.clone(),
        }
    }

    pub fn forecast_sources(&self) -> ForecastSources {
        ForecastSources {
            climate_url: self.api.climate_url.clone(),
            climate_site: self.climate.coordinate(),
            climate_model: self.climate.model.clone(),
            flood_url: self.api.flood_url.clone(),
            discharge_site: self.discharge.coordinate(),
            discharge_model: self.discharge.model.clone(),
        }
    }
}
