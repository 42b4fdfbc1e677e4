/// Persisted flood model: the fitted forest together with the feature
/// schema it was fit on.
///
/// Stored as JSON. The schema travels with the forest so that prediction
/// can refuse input whose columns differ in name or order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::features::{FeatureMatrix, FeatureSchema};
use crate::forest::RandomForest;
use crate::logging::{self, DataSource};
use crate::model::FloodError;

/// Bumped whenever the serialized layout changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Discharge quantile threshold the labels were derived from.
    pub flood_threshold: f64,
    pub schema: FeatureSchema,
    pub forest: RandomForest,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl TrainedModel {
    /// Wraps a fitted forest. Fails if the forest was fit on columns other
    /// than the schema's.
    pub fn new(forest: RandomForest, schema: FeatureSchema, flood_threshold: f64) -> Result<Self, FloodError> {
        schema.validate(forest.feature_names())?;
        Ok(TrainedModel {
            format_version: MODEL_FORMAT_VERSION,
            trained_at: Utc::now(),
            flood_threshold,
            schema,
            forest,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), FloodError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        logging::info(
            DataSource::Model,
            Some(&path.display().to_string()),
            &format!("saved model ({} trees)", self.forest.n_trees()),
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, FloodError> {
        let contents = fs::read_to_string(path)?;

        let probe: VersionProbe = serde_json::from_str(&contents)
            .map_err(|e| FloodError::ModelFormat(format!("{}: no format version ({})", path.display(), e)))?;
        if probe.format_version != MODEL_FORMAT_VERSION {
            return Err(FloodError::ModelFormat(format!(
                "{}: format version {} is not supported (expected {})",
                path.display(),
                probe.format_version,
                MODEL_FORMAT_VERSION
            )));
        }

        let model: TrainedModel = serde_json::from_str(&contents)
            .map_err(|e| FloodError::ModelFormat(format!("{}: {}", path.display(), e)))?;
        model.schema.validate(model.forest.feature_names())?;
        logging::info(
            DataSource::Model,
            Some(&path.display().to_string()),
            &format!("loaded model ({} trees, trained {})", model.forest.n_trees(), model.trained_at),
        );
        Ok(model)
    }

    /// Flood probability per row, after checking the input's columns.
    pub fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, FloodError> {
        self.schema.validate(features.columns())?;
        self.forest.predict_proba(features.rows())
    }

    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<bool>, FloodError> {
        self.schema.validate(features.columns())?;
        self.forest.predict(features.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RowKey;
    use crate::forest::ForestConfig;
    use chrono::NaiveDate;

    fn schema() -> FeatureSchema {
        use crate::analysis::features::FeatureColumn;
        FeatureSchema::new(vec![FeatureColumn::raw("a"), FeatureColumn::raw("b")])
    }

    fn matrix(columns: &[&str]) -> FeatureMatrix {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let keys = (0..30)
            .map(|i| RowKey::on(day + chrono::Duration::days(i)))
            .collect();
        FeatureMatrix::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows, keys).unwrap()
    }

    fn fitted() -> TrainedModel {
        let x = matrix(&["a", "b"]);
        let y: Vec<bool> = x.rows().iter().map(|r| r[0] > 20.0).collect();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 5,
            ..Default::default()
        });
        forest.fit(&x, &y).unwrap();
        TrainedModel::new(forest, schema(), 20.0).unwrap()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("flocast_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let model = fitted();
        let path = temp_path("model_round_trip");
        let mut loaded = None;
        let logs = logging::capture_events(|| {
            model.save(&path).unwrap();
            loaded = Some(TrainedModel::load(&path).unwrap());
        });
        fs::remove_file(&path).ok();
        let loaded = loaded.unwrap();

        assert!(logs.contains("MODEL"), "{}", logs);
        assert!(logs.contains("saved model (5 trees)"));
        assert!(logs.contains("loaded model (5 trees"));

        assert_eq!(loaded.format_version, MODEL_FORMAT_VERSION);
        assert_eq!(loaded.schema, model.schema);
        assert_eq!(loaded.forest.n_trees(), model.forest.n_trees());
        let x = matrix(&["a", "b"]);
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_reordered_columns_are_refused() {
        let model = fitted();
        let err = model.predict_proba(&matrix(&["b", "a"])).unwrap_err();
        assert!(matches!(err, FloodError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_forest_and_schema_must_agree() {
        let model = fitted();
        let other = FeatureSchema::new(vec![crate::analysis::features::FeatureColumn::raw("a")]);
        assert!(TrainedModel::new(model.forest, other, 1.0).is_err());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let path = temp_path("model_version");
        fs::write(&path, r#"{"format_version": 99}"#).unwrap();
        let err = TrainedModel::load(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, FloodError::ModelFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TrainedModel::load(Path::new("/nonexistent/flocast/model.json")).unwrap_err();
        assert!(matches!(err, FloodError::Io(_)));
    }
}
