/// Applies a persisted flood model to forward-looking data and aggregates
/// the daily flood probability by calendar month.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::analysis::features::prepare_features;
use crate::artifact::TrainedModel;
use crate::dataset::{DailyFrame, JoinKind};
use crate::ingest::client::WeatherApi;
use crate::ingest::daily::{fetch_daily_climate, fetch_daily_discharge};
use crate::logging::{self, DataSource};
use crate::model::{Coordinate, FloodError};

/// About six months ahead.
pub const DEFAULT_HORIZON_DAYS: i64 = 182;

/// Inclusive forecast window starting today.
pub fn forecast_window(today: NaiveDate, horizon_days: i64) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(horizon_days.max(0)))
}

/// Outer join on date: days present in only one source are kept and their
/// gaps forward-filled during feature preparation.
pub fn merge_forecast_inputs(discharge: &DailyFrame, climate: &DailyFrame) -> DailyFrame {
    discharge.merge(climate, JoinKind::Outer)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyPrediction {
    pub date: NaiveDate,
    pub probability: f64,
    pub flood: bool,
}

/// Runs the model over every row that has a complete feature vector.
pub fn predict_frame(model: &TrainedModel, merged: &DailyFrame) -> Result<(Vec<DailyPrediction>, usize), FloodError> {
    let features = prepare_features(merged, &model.schema)?;
    let probabilities = model.predict_proba(&features)?;

    let predictions = features
        .keys()
        .iter()
        .zip(probabilities)
        .map(|(key, probability)| DailyPrediction {
            date: key.date,
            probability,
            flood: probability > 0.5,
        })
        .collect();
    Ok((predictions, features.dropped()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyProbability {
    pub year: i32,
    pub month: u32,
    pub mean_probability: f64,
    /// Days predicted as floods (probability above 0.5).
    pub flood_days: usize,
    pub days: usize,
}

/// Mean flood probability per (year, month), in calendar order.
pub fn monthly_probabilities(predictions: &[DailyPrediction]) -> Vec<MonthlyProbability> {
    let mut months: BTreeMap<(i32, u32), (f64, usize, usize)> = BTreeMap::new();
    for p in predictions {
        let entry = months.entry((p.date.year(), p.date.month())).or_insert((0.0, 0, 0));
        entry.0 += p.probability;
        entry.1 += usize::from(p.flood);
        entry.2 += 1;
    }

    months
        .into_iter()
        .map(|((year, month), (sum, flood_days, days))| MonthlyProbability {
            year,
            month,
            mean_probability: sum / days as f64,
            flood_days,
            days,
        })
        .collect()
}

/// Where and how to fetch the forecast inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSources {
    pub climate_url: String,
    pub climate_site: Coordinate,
    pub climate_model: Option<String>,
    pub flood_url: String,
    pub discharge_site: Coordinate,
    pub discharge_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForecastReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub predictions: Vec<DailyPrediction>,
    pub monthly: Vec<MonthlyProbability>,
    /// Rows without a complete feature vector (rolling warm-up, leading gaps).
    pub dropped_rows: usize,
}

/// Fetches both series for the window, predicts, and aggregates by month.
pub fn run_forecast(
    api: &dyn WeatherApi,
    model: &TrainedModel,
    sources: &ForecastSources,
    today: NaiveDate,
    horizon_days: i64,
) -> Result<ForecastReport, FloodError> {
    let (start_date, end_date) = forecast_window(today, horizon_days);

    let climate = fetch_daily_climate(
        api,
        &sources.climate_url,
        sources.climate_site,
        sources.climate_model.as_deref(),
        start_date,
        end_date,
    )?;
    let discharge = fetch_daily_discharge(
        api,
        &sources.flood_url,
        sources.discharge_site,
        sources.discharge_model.as_deref(),
        start_date,
        end_date,
    )?;

    let merged = merge_forecast_inputs(&discharge.frame, &climate.frame);
    let (predictions, dropped_rows) = predict_frame(model, &merged)?;
    if predictions.is_empty() {
        return Err(FloodError::NoDataAvailable(format!(
            "no complete feature rows between {} and {}",
            start_date, end_date
        )));
    }

    logging::info(
        DataSource::Model,
        None,
        &format!(
            "predicted {} days between {} and {} ({} incomplete rows skipped)",
            predictions.len(),
            start_date,
            end_date,
            dropped_rows
        ),
    );

    let monthly = monthly_probabilities(&predictions);
    Ok(ForecastReport {
        start_date,
        end_date,
        predictions,
        monthly,
        dropped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RowKey;
    use crate::model::{CLIMATE_VARIABLES, VAR_RIVER_DISCHARGE};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_forecast_window_is_inclusive() {
        let (start, end) = forecast_window(day(2024, 1, 1), DEFAULT_HORIZON_DAYS);
        assert_eq!(start, day(2024, 1, 1));
        assert_eq!(end, day(2024, 7, 1));
        assert_eq!(forecast_window(day(2024, 1, 1), -3).1, day(2024, 1, 1));
    }

    #[test]
    fn test_monthly_probabilities_group_by_year_and_month() {
        let predictions = vec![
            DailyPrediction { date: day(2024, 12, 30), probability: 0.2, flood: false },
            DailyPrediction { date: day(2024, 12, 31), probability: 0.8, flood: true },
            DailyPrediction { date: day(2025, 1, 1), probability: 0.1, flood: false },
            DailyPrediction { date: day(2025, 12, 1), probability: 0.3, flood: false },
        ];
        let monthly = monthly_probabilities(&predictions);

        assert_eq!(monthly.len(), 3, "December 2024 and December 2025 stay separate");
        assert_eq!((monthly[0].year, monthly[0].month), (2024, 12));
        assert!((monthly[0].mean_probability - 0.5).abs() < 1e-12);
        assert_eq!(monthly[0].flood_days, 1);
        assert_eq!(monthly[0].days, 2);
        assert_eq!((monthly[2].year, monthly[2].month), (2025, 12));
    }

    #[test]
    fn test_merge_keeps_days_from_either_source() {
        let mut discharge = DailyFrame::with_columns(&[VAR_RIVER_DISCHARGE]);
        discharge.push_row(RowKey::on(day(2024, 1, 2)), vec![Some(1.0)]).unwrap();
        let mut climate = DailyFrame::with_columns(CLIMATE_VARIABLES);
        climate
            .push_row(RowKey::on(day(2024, 1, 1)), vec![Some(0.0); CLIMATE_VARIABLES.len()])
            .unwrap();

        let merged = merge_forecast_inputs(&discharge, &climate);
        assert_eq!(merged.dates(), vec![day(2024, 1, 1), day(2024, 1, 2)]);
        assert_eq!(merged.columns()[0], VAR_RIVER_DISCHARGE);
        assert_eq!(merged.row(0)[0], None);
    }
}
