/// Core data types for the flocast flood prediction pipeline.
///
/// This module defines the shared domain model imported by all other modules:
/// coordinates, the Open-Meteo variable names we request, flood severity
/// categories, and the crate-wide error type. It contains no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Open-Meteo daily variable names
// ---------------------------------------------------------------------------

pub const VAR_TEMPERATURE_MEAN: &str = "temperature_2m_mean";
pub const VAR_TEMPERATURE_MAX: &str = "temperature_2m_max";
pub const VAR_TEMPERATURE_MIN: &str = "temperature_2m_min";
pub const VAR_HUMIDITY_MEAN: &str = "relative_humidity_2m_mean";
pub const VAR_PRECIPITATION_SUM: &str = "precipitation_sum";
pub const VAR_SOIL_MOISTURE_MEAN: &str = "soil_moisture_0_to_10cm_mean";

pub const VAR_RIVER_DISCHARGE: &str = "river_discharge";
pub const VAR_RIVER_DISCHARGE_MEAN: &str = "river_discharge_mean";
pub const VAR_RIVER_DISCHARGE_MAX: &str = "river_discharge_max";
pub const VAR_RIVER_DISCHARGE_MIN: &str = "river_discharge_min";

/// Climate variables requested for the training and forecast sites.
/// Order matters: it is the column order of the resulting frame.
pub const CLIMATE_VARIABLES: &[&str] = &[
    VAR_TEMPERATURE_MEAN,
    VAR_TEMPERATURE_MAX,
    VAR_TEMPERATURE_MIN,
    VAR_HUMIDITY_MEAN,
    VAR_PRECIPITATION_SUM,
    VAR_SOIL_MOISTURE_MEAN,
];

/// River discharge ensemble statistics requested for grid forecasts.
pub const GRID_DISCHARGE_VARIABLES: &[&str] = &[
    VAR_RIVER_DISCHARGE,
    VAR_RIVER_DISCHARGE_MEAN,
    VAR_RIVER_DISCHARGE_MAX,
    VAR_RIVER_DISCHARGE_MIN,
];

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A WGS84 point, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate { latitude, longitude }
    }

    /// Bit-exact representation used as a join/hash key.
    ///
    /// Grid coordinates are generated once and carried through unchanged, so
    /// exact equality is the right notion of "same location" here.
    pub fn key_bits(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}°N {:.6}°E", self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Flood severity
// ---------------------------------------------------------------------------

/// Forecast flood severity, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FloodSeverity {
    #[serde(rename = "no flood")]
    NoFlood,
    #[serde(rename = "minor flood")]
    MinorFlood,
    #[serde(rename = "major flood")]
    MajorFlood,
}

impl FloodSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloodSeverity::NoFlood => "no flood",
            FloodSeverity::MinorFlood => "minor flood",
            FloodSeverity::MajorFlood => "major flood",
        }
    }
}

impl fmt::Display for FloodSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise anywhere in the fetch → train → predict pipeline.
#[derive(Debug, PartialEq)]
pub enum FloodError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    Http(String),
    /// Non-2xx response from the weather API, with the provider's reason
    /// string when the body carried one.
    HttpStatus { status: u16, reason: Option<String> },
    /// The response body could not be deserialized or was inconsistent.
    ParseError(String),
    /// The API answered but contained no usable values.
    NoDataAvailable(String),
    /// A column required by a later stage is absent from the frame.
    MissingColumn(String),
    /// Row or column counts disagree (e.g. values vs. dates).
    ShapeMismatch(String),
    /// Not enough rows for the requested split or fold count.
    InsufficientData {
        operation: &'static str,
        required: usize,
        available: usize,
    },
    /// Prediction input columns differ from the columns the model was fit on.
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// Invalid or unreadable configuration.
    Config(String),
    /// Filesystem failure.
    Io(String),
    /// CSV read/write failure.
    Csv(String),
    /// The model artifact is malformed or of an unsupported version.
    ModelFormat(String),
}

impl FloodError {
    /// True for failures worth retrying: transport errors, rate limiting,
    /// and server-side errors. Data-contract violations are never retried.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FloodError::Http(_) => true,
            FloodError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for FloodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodError::Http(msg) => write!(f, "HTTP error: {}", msg),
            FloodError::HttpStatus { status, reason } => match reason {
                Some(reason) => write!(f, "HTTP {}: {}", status, reason),
                None => write!(f, "HTTP {}", status),
            },
            FloodError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            FloodError::NoDataAvailable(msg) => write!(f, "No data available: {}", msg),
            FloodError::MissingColumn(name) => write!(f, "Missing column: {}", name),
            FloodError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            FloodError::InsufficientData {
                operation,
                required,
                available,
            } => write!(
                f,
                "Insufficient data for {}: need at least {} rows, have {}",
                operation, required, available
            ),
            FloodError::SchemaMismatch { expected, found } => write!(
                f,
                "Feature schema mismatch: model expects [{}], input has [{}]",
                expected.join(", "),
                found.join(", ")
            ),
            FloodError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FloodError::Io(msg) => write!(f, "I/O error: {}", msg),
            FloodError::Csv(msg) => write!(f, "CSV error: {}", msg),
            FloodError::ModelFormat(msg) => write!(f, "Model format error: {}", msg),
        }
    }
}

impl std::error::Error for FloodError {}

impl From<std::io::Error> for FloodError {
    fn from(e: std::io::Error) -> Self {
        FloodError::Io(e.to_string())
    }
}

impl From<csv::Error> for FloodError {
    fn from(e: csv::Error) -> Self {
        FloodError::Csv(e.to_string())
    }
}

impl From<serde_json::Error> for FloodError {
    fn from(e: serde_json::Error) -> Self {
        FloodError::ParseError(format!("JSON deserialization failed: {}", e))
    }
}

impl From<reqwest::Error> for FloodError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FloodError::HttpStatus {
                status: status.as_u16(),
                reason: None,
            },
            None => FloodError::Http(e.to_string()),
        }
    }
}
