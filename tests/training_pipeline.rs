/// Integration tests for the train → save → load → predict path.
///
/// These tests verify:
/// 1. Inner merge keeps only days present in both sources
/// 2. Labels, split, cross-validation and evaluation run end to end
/// 3. The saved model reloads and predicts like the original
/// 4. Monthly aggregation of the reloaded model's predictions
/// 5. Too little merged history is rejected, never split into empty sides
///
/// No network access; the input series are synthetic.
///
/// Run with: cargo test --test training_pipeline

use chrono::{Duration, NaiveDate};

use flocast::analysis::features::DISCHARGE_ROLLING_MEAN;
use flocast::artifact::TrainedModel;
use flocast::dataset::{DailyFrame, RowKey};
use flocast::forest::ForestConfig;
use flocast::model::{CLIMATE_VARIABLES, VAR_RIVER_DISCHARGE};
use flocast::pipeline::{merge_training_inputs, train_model};
use flocast::predictor::{merge_forecast_inputs, monthly_probabilities, predict_frame};
use flocast::training::{Trainer, TrainerConfig};

const DAYS: i64 = 400;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// Seasonal discharge with a wet season peak around day 180.
fn discharge_on(day: i64) -> f64 {
    let phase = (day as f64) * std::f64::consts::TAU / 365.0;
    1000.0 - 800.0 * phase.cos() + (day % 7) as f64
}

fn discharge_frame(days: std::ops::Range<i64>) -> DailyFrame {
    let mut frame = DailyFrame::with_columns(&[VAR_RIVER_DISCHARGE]);
    for d in days {
        frame
            .push_row(RowKey::on(start() + Duration::days(d)), vec![Some(discharge_on(d))])
            .unwrap();
    }
    frame
}

fn climate_frame(days: std::ops::Range<i64>) -> DailyFrame {
    let mut frame = DailyFrame::with_columns(CLIMATE_VARIABLES);
    for d in days {
        let wetness = discharge_on(d) / 1800.0;
        frame
            .push_row(
                RowKey::on(start() + Duration::days(d)),
                vec![
                    Some(26.0 + (d % 5) as f64 * 0.3),
                    Some(31.0 + (d % 3) as f64 * 0.5),
                    Some(21.0 + (d % 4) as f64 * 0.2),
                    Some(55.0 + 35.0 * wetness),
                    Some(20.0 * wetness),
                    Some(0.1 + 0.3 * wetness),
                ],
            )
            .unwrap();
    }
    frame
}

fn trainer() -> Trainer {
    Trainer::new(TrainerConfig {
        forest: ForestConfig {
            n_trees: 15,
            ..Default::default()
        },
        ..Default::default()
    })
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("flocast_it_{}_{}.json", name, std::process::id()))
}

#[test]
fn test_training_merge_drops_unmatched_days() {
    // Climate starts ten days later than discharge
    let merged = merge_training_inputs(&discharge_frame(0..30), &climate_frame(10..30));
    assert_eq!(merged.len(), 20);
    assert_eq!(merged.dates()[0], start() + Duration::days(10));
    assert_eq!(merged.columns()[0], VAR_RIVER_DISCHARGE);
    assert_eq!(merged.columns().len(), 1 + CLIMATE_VARIABLES.len());
}

#[test]
fn test_train_evaluate_save_load_predict() {
    let discharge = discharge_frame(0..DAYS);
    let climate = climate_frame(0..DAYS);

    let run = train_model(&discharge, &climate, &trainer(), 0.9).unwrap();

    assert_eq!(run.merged_rows, DAYS as usize);
    // Three-day rolling mean is undefined for the first two days
    assert_eq!(run.dropped_rows, 2);
    assert_eq!(run.train_rows + run.test_rows, DAYS as usize - 2);
    assert!(run.positives > 0 && run.positives < run.train_rows + run.test_rows);
    assert!(run.model.flood_threshold > 1000.0);

    // Labels come straight from discharge, which is a feature
    assert!(run.evaluation.accuracy > 0.9, "accuracy {}", run.evaluation.accuracy);
    assert_eq!(run.cross_validation.scores.len(), 5);
    assert!(run.cross_validation.mean > 0.9);

    let ranking = &run.evaluation.feature_ranking;
    assert_eq!(ranking.len(), 8);
    for pair in ranking.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "ranking must be ascending");
    }
    let total: f64 = ranking.iter().map(|(_, v)| v).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(ranking.iter().any(|(name, _)| name == DISCHARGE_ROLLING_MEAN));

    let path = temp_path("pipeline_model");
    run.model.save(&path).unwrap();
    let loaded = TrainedModel::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    // Forecast window: 60 days past the training data, climate missing on the
    // last day so the outer merge forward-fills it
    let merged = merge_forecast_inputs(&discharge_frame(DAYS..DAYS + 60), &climate_frame(DAYS..DAYS + 59));
    assert_eq!(merged.len(), 60);

    let (predictions, dropped) = predict_frame(&loaded, &merged).unwrap();
    let (original, _) = predict_frame(&run.model, &merged).unwrap();
    assert_eq!(dropped, 2);
    assert_eq!(predictions.len(), 58);
    assert_eq!(predictions, original);
    for p in &predictions {
        assert!((0.0..=1.0).contains(&p.probability));
        assert_eq!(p.flood, p.probability > 0.5);
    }

    let monthly = monthly_probabilities(&predictions);
    let days: usize = monthly.iter().map(|m| m.days).sum();
    assert_eq!(days, 58);
    for pair in monthly.windows(2) {
        assert!((pair[0].year, pair[0].month) < (pair[1].year, pair[1].month));
    }
}

#[test]
fn test_disjoint_sources_cannot_train() {
    let err = train_model(&discharge_frame(0..50), &climate_frame(100..150), &trainer(), 0.9).unwrap_err();
    assert!(matches!(err, flocast::model::FloodError::NoDataAvailable(_)));
}

#[test]
fn test_too_few_merged_days_is_insufficient_data() {
    // Six days leave four feature rows after the rolling-mean warm-up
    let err = train_model(&discharge_frame(0..6), &climate_frame(0..6), &trainer(), 0.9).unwrap_err();
    assert!(
        matches!(err, flocast::model::FloodError::InsufficientData { required: 5, available: 4, .. }),
        "{:?}",
        err
    );

    // Seven days give exactly the five rows a split needs
    let run = train_model(&discharge_frame(0..7), &climate_frame(0..7), &trainer(), 0.9).unwrap();
    assert_eq!(run.train_rows, 4);
    assert_eq!(run.test_rows, 1);
    assert_eq!(run.cross_validation.scores.len(), 5);
}
