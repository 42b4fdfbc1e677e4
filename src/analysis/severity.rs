/// Fixed-threshold flood severity for grid forecasts, and the severity CSV
/// that doubles as a cache of the grid fetch.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dataset::DailyFrame;
use crate::model::{
    FloodError, FloodSeverity, VAR_RIVER_DISCHARGE, VAR_RIVER_DISCHARGE_MAX,
    VAR_RIVER_DISCHARGE_MEAN, VAR_RIVER_DISCHARGE_MIN,
};

/// Mean discharge (m³/s) above which a day is at least a minor flood.
pub const MINOR_FLOOD_THRESHOLD: f64 = 10.0;
/// Mean discharge (m³/s) above which a day is a major flood.
pub const MAJOR_FLOOD_THRESHOLD: f64 = 30.0;

/// Classifies a mean discharge value. Comparisons are strict, so a value
/// exactly on a boundary falls into the lower category; NaN is "no flood".
pub fn classify_flood(discharge_mean: f64) -> FloodSeverity {
    if discharge_mean > MAJOR_FLOOD_THRESHOLD {
        FloodSeverity::MajorFlood
    } else if discharge_mean > MINOR_FLOOD_THRESHOLD {
        FloodSeverity::MinorFlood
    } else {
        FloodSeverity::NoFlood
    }
}

/// One row of `forecast_river_discharge_flood_severity.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRecord {
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub river_discharge: Option<f64>,
    pub river_discharge_mean: Option<f64>,
    pub river_discharge_max: Option<f64>,
    pub river_discharge_min: Option<f64>,
    pub flood_severity: FloodSeverity,
}

/// Classifies every row of a location-keyed grid discharge frame.
pub fn classify_grid_frame(frame: &DailyFrame) -> Result<Vec<SeverityRecord>, FloodError> {
    let discharge = frame.column(VAR_RIVER_DISCHARGE)?;
    let mean = frame.column(VAR_RIVER_DISCHARGE_MEAN)?;
    let max = frame.column(VAR_RIVER_DISCHARGE_MAX)?;
    let min = frame.column(VAR_RIVER_DISCHARGE_MIN)?;

    frame
        .keys()
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let location = key.location.ok_or_else(|| {
                FloodError::MissingColumn(format!("location for grid row dated {}", key.date))
            })?;
            Ok(SeverityRecord {
                date: key.date,
                latitude: location.latitude,
                longitude: location.longitude,
                river_discharge: discharge[i],
                river_discharge_mean: mean[i],
                river_discharge_max: max[i],
                river_discharge_min: min[i],
                flood_severity: classify_flood(mean[i].unwrap_or(f64::NAN)),
            })
        })
        .collect()
}

pub fn write_severity_csv(path: &Path, records: &[SeverityRecord]) -> Result<(), FloodError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_severity_csv(path: &Path) -> Result<Vec<SeverityRecord>, FloodError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Per-severity day counts, in ascending severity order.
pub fn severity_counts(records: &[SeverityRecord]) -> Vec<(FloodSeverity, usize)> {
    [
        FloodSeverity::NoFlood,
        FloodSeverity::MinorFlood,
        FloodSeverity::MajorFlood,
    ]
    .into_iter()
    .map(|s| (s, records.iter().filter(|r| r.flood_severity == s).count()))
    .collect()
}
