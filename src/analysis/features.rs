/// Feature engineering: the explicit feature schema, rolling-window
/// derivation, and extraction of a dense feature matrix from a frame.
///
/// The schema is persisted with the model, so the predictor can check that
/// its input carries exactly the columns the model was fit on, in the same
/// order, before a single prediction is made.

use serde::{Deserialize, Serialize};

use crate::analysis::labels::{flood_threshold, label_flood_occurred};
use crate::dataset::{DailyFrame, RowKey};
use crate::model::{
    FloodError, VAR_HUMIDITY_MEAN, VAR_PRECIPITATION_SUM, VAR_RIVER_DISCHARGE,
    VAR_SOIL_MOISTURE_MEAN, VAR_TEMPERATURE_MAX, VAR_TEMPERATURE_MEAN, VAR_TEMPERATURE_MIN,
};

/// Name of the derived 3-day trailing discharge mean.
pub const DISCHARGE_ROLLING_MEAN: &str = "discharge_rolling_mean";
pub const ROLLING_WINDOW: usize = 3;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// How a feature column is obtained from the merged frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Taken as-is from the frame column of the same name.
    Raw,
    /// Trailing mean over the current and preceding `window - 1` rows.
    RollingMean { source: String, window: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureColumn {
    pub fn raw(name: &str) -> Self {
        FeatureColumn {
            name: name.to_string(),
            kind: FeatureKind::Raw,
        }
    }

    pub fn rolling_mean(name: &str, source: &str, window: usize) -> Self {
        FeatureColumn {
            name: name.to_string(),
            kind: FeatureKind::RollingMean {
                source: source.to_string(),
                window,
            },
        }
    }
}

/// Ordered list of named, typed feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<FeatureColumn>) -> Self {
        FeatureSchema { columns }
    }

    /// Raw discharge and climate variables plus the 3-day discharge mean.
    pub fn flood_default() -> Self {
        FeatureSchema::new(vec![
            FeatureColumn::raw(VAR_RIVER_DISCHARGE),
            FeatureColumn::raw(VAR_TEMPERATURE_MEAN),
            FeatureColumn::raw(VAR_TEMPERATURE_MAX),
            FeatureColumn::raw(VAR_TEMPERATURE_MIN),
            FeatureColumn::raw(VAR_HUMIDITY_MEAN),
            FeatureColumn::raw(VAR_PRECIPITATION_SUM),
            FeatureColumn::raw(VAR_SOIL_MOISTURE_MEAN),
            FeatureColumn::rolling_mean(DISCHARGE_ROLLING_MEAN, VAR_RIVER_DISCHARGE, ROLLING_WINDOW),
        ])
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Adds every derived column to the frame. Run after forward-fill.
    pub fn derive(&self, frame: &mut DailyFrame) -> Result<(), FloodError> {
        for column in &self.columns {
            if let FeatureKind::RollingMean { source, window } = &column.kind {
                let values = frame.column(source)?;
                frame.add_column(&column.name, rolling_mean(&values, *window))?;
            }
        }
        Ok(())
    }

    /// Fails unless `found` names exactly this schema's columns, in order.
    pub fn validate(&self, found: &[String]) -> Result<(), FloodError> {
        let expected = self.names();
        if expected.as_slice() != found {
            return Err(FloodError::SchemaMismatch {
                expected,
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    /// Builds the dense matrix in schema order, dropping rows where any
    /// feature is still undefined.
    pub fn extract(&self, frame: &DailyFrame) -> Result<FeatureMatrix, FloodError> {
        let indices = self
            .columns
            .iter()
            .map(|c| {
                frame
                    .column_index(&c.name)
                    .ok_or_else(|| FloodError::MissingColumn(c.name.clone()))
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let mut matrix = FeatureMatrix::new(self.names());
        for (i, key) in frame.keys().iter().enumerate() {
            let row = frame.row(i);
            let values: Option<Vec<f64>> = indices
                .iter()
                .map(|&c| row[c].filter(|v| v.is_finite()))
                .collect();
            match values {
                Some(values) => {
                    matrix.rows.push(values);
                    matrix.keys.push(*key);
                    matrix.source_rows.push(i);
                }
                None => matrix.dropped += 1,
            }
        }
        Ok(matrix)
    }
}

/// Trailing mean over `window` rows; undefined until a full window of
/// present values is available.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum: Option<f64> = slice.iter().copied().sum();
            sum.map(|s| s / window as f64)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Matrices
// ---------------------------------------------------------------------------

/// Dense feature rows with their column names and source keys.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    keys: Vec<RowKey>,
    source_rows: Vec<usize>,
    dropped: usize,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        FeatureMatrix {
            columns,
            rows: Vec::new(),
            keys: Vec::new(),
            source_rows: Vec::new(),
            dropped: 0,
        }
    }

    /// Builds a matrix directly from rows, e.g. for synthetic data.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
        keys: Vec<RowKey>,
    ) -> Result<Self, FloodError> {
        if rows.len() != keys.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "{} feature rows but {} keys",
                rows.len(),
                keys.len()
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(FloodError::ShapeMismatch(format!(
                "feature row has {} values, expected {}",
                bad.len(),
                columns.len()
            )));
        }
        let source_rows = (0..rows.len()).collect();
        Ok(FeatureMatrix {
            columns,
            rows,
            keys,
            source_rows,
            dropped: 0,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    /// Index of each row in the frame it was extracted from.
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Rows skipped during extraction because a feature was undefined.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn subset(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            keys: indices.iter().map(|&i| self.keys[i]).collect(),
            source_rows: indices.iter().map(|&i| self.source_rows[i]).collect(),
            dropped: 0,
        }
    }
}

/// Feature matrix plus `flood_occurred` labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSet {
    pub features: FeatureMatrix,
    pub labels: Vec<bool>,
    pub flood_threshold: f64,
}

impl LabeledSet {
    pub fn new(features: FeatureMatrix, labels: Vec<bool>, flood_threshold: f64) -> Result<Self, FloodError> {
        if features.len() != labels.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        Ok(LabeledSet {
            features,
            labels,
            flood_threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    pub fn subset(&self, indices: &[usize]) -> LabeledSet {
        LabeledSet {
            features: self.features.subset(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            flood_threshold: self.flood_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Labels a merged climate + discharge frame and builds its feature matrix.
///
/// Order: threshold and labels on the raw discharge column, then
/// forward-fill, then derived features, then drop undefined rows.
pub fn prepare_training_set(
    frame: &DailyFrame,
    schema: &FeatureSchema,
    flood_quantile: f64,
) -> Result<LabeledSet, FloodError> {
    let discharge = frame.column(VAR_RIVER_DISCHARGE)?;
    let threshold = flood_threshold(&discharge, flood_quantile)?;
    let all_labels = label_flood_occurred(&discharge, threshold);

    let features = prepare_features(frame, schema)?;
    let labels = features.source_rows().iter().map(|&i| all_labels[i]).collect();

    LabeledSet::new(features, labels, threshold)
}

/// Forward-fills, derives, and extracts features for prediction input.
pub fn prepare_features(frame: &DailyFrame, schema: &FeatureSchema) -> Result<FeatureMatrix, FloodError> {
    let mut working = frame.clone();
    working.forward_fill();
    schema.derive(&mut working)?;
    schema.extract(&working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CLIMATE_VARIABLES;
    use chrono::NaiveDate;

    fn merged_frame(discharge: &[Option<f64>]) -> DailyFrame {
        let mut columns = vec![VAR_RIVER_DISCHARGE];
        columns.extend_from_slice(CLIMATE_VARIABLES);
        let mut frame = DailyFrame::with_columns(&columns);
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        for (i, d) in discharge.iter().enumerate() {
            let mut row = vec![*d];
            row.extend((0..CLIMATE_VARIABLES.len()).map(|c| Some((i + c) as f64)));
            frame
                .push_row(RowKey::on(start + chrono::Duration::days(i as i64)), row)
                .unwrap();
        }
        frame
    }

    #[test]
    fn test_rolling_mean_window_three() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), None, Some(6.0)];
        let rolled = rolling_mean(&values, 3);
        assert_eq!(rolled, vec![None, None, Some(2.0), Some(3.0), None, None]);
    }

    #[test]
    fn test_rolling_mean_degenerate_windows() {
        assert_eq!(rolling_mean(&[Some(1.0)], 0), vec![None]);
        assert_eq!(rolling_mean(&[Some(1.0), Some(3.0)], 1), vec![Some(1.0), Some(3.0)]);
        assert!(rolling_mean(&[], 3).is_empty());
    }

    #[test]
    fn test_default_schema_order() {
        let names = FeatureSchema::flood_default().names();
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], VAR_RIVER_DISCHARGE);
        assert_eq!(names[6], VAR_SOIL_MOISTURE_MEAN);
        assert_eq!(names[7], DISCHARGE_ROLLING_MEAN);
    }

    #[test]
    fn test_validate_rejects_reordered_columns() {
        let schema = FeatureSchema::flood_default();
        let mut found = schema.names();
        assert!(schema.validate(&found).is_ok());

        found.swap(1, 2);
        match schema.validate(&found) {
            Err(FloodError::SchemaMismatch { expected, found: got }) => {
                assert_eq!(expected, schema.names());
                assert_eq!(got, found);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_training_set_drops_rolling_warmup_rows() {
        let discharge: Vec<Option<f64>> = (1..=20).map(|v| Some(v as f64)).collect();
        let set = prepare_training_set(&merged_frame(&discharge), &FeatureSchema::flood_default(), 0.95)
            .unwrap();

        assert_eq!(set.len(), 18);
        assert_eq!(set.features.dropped(), 2);
        assert_eq!(set.features.columns(), FeatureSchema::flood_default().names().as_slice());
        // rolling mean of 1, 2, 3
        assert_eq!(set.features.rows()[0][7], 2.0);
        // threshold over 1..=20 is 19.05, so 20 is the only positive
        assert_eq!(set.positives(), 1);
        assert!(set.labels[17]);
    }

    #[test]
    fn test_labels_are_computed_before_forward_fill() {
        let mut discharge: Vec<Option<f64>> = (1..=10).map(|_| Some(1.0)).collect();
        discharge[5] = Some(100.0);
        discharge[6] = None;
        let set = prepare_training_set(&merged_frame(&discharge), &FeatureSchema::flood_default(), 0.95)
            .unwrap();

        // Day 6 is forward-filled with 100.0 but its label stays negative.
        let day6 = set.features.source_rows().iter().position(|&r| r == 6).unwrap();
        assert_eq!(set.features.rows()[day6][0], 100.0);
        assert!(!set.labels[day6]);
        assert_eq!(set.positives(), 1);
    }

    #[test]
    fn test_missing_feature_column_is_reported() {
        let mut frame = DailyFrame::with_columns(&[VAR_RIVER_DISCHARGE]);
        frame
            .push_row(RowKey::on(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()), vec![Some(1.0)])
            .unwrap();
        let err = prepare_features(&frame, &FeatureSchema::flood_default()).unwrap_err();
        assert_eq!(err, FloodError::MissingColumn(VAR_TEMPERATURE_MEAN.to_string()));
    }

    #[test]
    fn test_schema_serializes_with_kind_tags() {
        let json = serde_json::to_string(&FeatureSchema::flood_default()).unwrap();
        assert!(json.contains("\"kind\":\"raw\""));
        assert!(json.contains("\"kind\":\"rolling_mean\""));
        let back: FeatureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FeatureSchema::flood_default());
    }
}
