/// Batched river-discharge fetch over a coordinate grid.
///
/// Each batch is one request with comma-joined coordinates. A batch that
/// fails for any reason (transport, API error, malformed or short response)
/// is logged and skipped; the remaining batches still run. The report says
/// which batches made it.

use chrono::NaiveDate;

use super::client::WeatherApi;
use super::open_meteo::DailyRequest;
use crate::dataset::DailyFrame;
use crate::logging::{self, DataSource, FailureType};
use crate::model::{Coordinate, FloodError, GRID_DISCHARGE_VARIABLES};

/// Date range and model for a grid fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFetchParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub batch: usize,
    pub locations: usize,
    pub failure_type: FailureType,
    pub error: String,
}

/// Outcome of a grid fetch, by batch index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridFetchReport {
    pub batches_total: usize,
    pub fetched: Vec<usize>,
    pub failed: Vec<BatchFailure>,
}

impl GridFetchReport {
    pub fn all_failed(&self) -> bool {
        self.batches_total > 0 && self.fetched.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GridFetch {
    /// Rows keyed by (date, requested coordinate); batch order, then
    /// in-batch location order, then date.
    pub frame: DailyFrame,
    pub report: GridFetchReport,
}

/// Fetches discharge, mean, max and min for every batch, skipping failures.
pub fn fetch_grid_discharge(
    api: &dyn WeatherApi,
    base_url: &str,
    batches: &[Vec<Coordinate>],
    params: &GridFetchParams,
) -> Result<GridFetch, FloodError> {
    if params.start_date > params.end_date {
        return Err(FloodError::Config(format!(
            "start date {} is after end date {}",
            params.start_date, params.end_date
        )));
    }

    let mut report = GridFetchReport {
        batches_total: batches.len(),
        ..Default::default()
    };
    let mut frames = Vec::new();

    for (index, batch) in batches.iter().enumerate() {
        match fetch_batch(api, base_url, batch, params) {
            Ok(frame) => {
                tracing::debug!(batch = index, rows = frame.len(), "grid batch fetched");
                frames.push(frame);
                report.fetched.push(index);
            }
            Err(e) => {
                let target = format!("batch {}", index);
                let failure_type = logging::log_fetch_failure(DataSource::Flood, &target, "grid discharge fetch", &e);
                report.failed.push(BatchFailure {
                    batch: index,
                    locations: batch.len(),
                    failure_type,
                    error: e.to_string(),
                });
            }
        }
    }

    logging::log_batch_summary(DataSource::Flood, report.batches_total, report.fetched.len(), report.failed.len());

    let frame = if frames.is_empty() {
        DailyFrame::with_columns(GRID_DISCHARGE_VARIABLES)
    } else {
        DailyFrame::concat(frames)?
    };
    Ok(GridFetch { frame, report })
}

/// One batch, all or nothing: a partial batch is treated as failed.
fn fetch_batch(
    api: &dyn WeatherApi,
    base_url: &str,
    batch: &[Coordinate],
    params: &GridFetchParams,
) -> Result<DailyFrame, FloodError> {
    let mut request = DailyRequest::new(batch.to_vec(), params.start_date, params.end_date, GRID_DISCHARGE_VARIABLES);
    if let Some(model) = &params.model {
        request = request.with_model(model);
    }

    let responses = api.fetch_daily(base_url, &request)?;
    if responses.len() != batch.len() {
        return Err(FloodError::ShapeMismatch(format!(
            "requested {} locations, response has {}",
            batch.len(),
            responses.len()
        )));
    }

    let frames = batch
        .iter()
        .zip(&responses)
        .map(|(requested, response)| {
            tracing::trace!(location = %requested, "processing grid location");
            response.to_frame(GRID_DISCHARGE_VARIABLES, Some(*requested))
        })
        .collect::<Result<Vec<_>, _>>()?;
    DailyFrame::concat(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::fixture_flood_batch_json;
    use crate::ingest::open_meteo::{parse_daily_response, LocationDaily};
    use std::cell::Cell;

    /// Serves the two-location fixture, failing on chosen call numbers.
    struct FlakyApi {
        fail_on: Vec<usize>,
        calls: Cell<usize>,
    }

    impl WeatherApi for FlakyApi {
        fn fetch_daily(&self, _base_url: &str, request: &DailyRequest) -> Result<Vec<LocationDaily>, FloodError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if self.fail_on.contains(&call) {
                return Err(FloodError::HttpStatus {
                    status: 503,
                    reason: None,
                });
            }
            let parsed = parse_daily_response(fixture_flood_batch_json())?;
            Ok(parsed.into_iter().take(request.locations.len()).collect())
        }
    }

    fn params() -> GridFetchParams {
        GridFetchParams {
            start_date: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            model: Some("forecast_v4".to_string()),
        }
    }

    fn batches() -> Vec<Vec<Coordinate>> {
        vec![
            vec![Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 2.0)],
            vec![Coordinate::new(2.0, 1.0), Coordinate::new(2.0, 2.0)],
            vec![Coordinate::new(3.0, 1.0)],
        ]
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let api = FlakyApi {
            fail_on: vec![1],
            calls: Cell::new(0),
        };
        let fetch = fetch_grid_discharge(&api, "http://unused", &batches(), &params()).unwrap();

        assert_eq!(fetch.report.batches_total, 3);
        assert_eq!(fetch.report.fetched, vec![0, 2]);
        assert_eq!(fetch.report.failed.len(), 1);
        assert_eq!(fetch.report.failed[0].batch, 1);
        assert_eq!(fetch.report.failed[0].failure_type, FailureType::Unexpected);

        // 3 locations x 2 days; rows keep the requested coordinates
        assert_eq!(fetch.frame.len(), 6);
        let locations: Vec<Coordinate> = fetch.frame.keys().iter().filter_map(|k| k.location).collect();
        assert_eq!(locations[0], Coordinate::new(1.0, 1.0));
        assert_eq!(locations[2], Coordinate::new(1.0, 2.0));
        assert_eq!(locations[4], Coordinate::new(3.0, 1.0));
    }

    #[test]
    fn test_all_batches_failing_yields_empty_frame() {
        let api = FlakyApi {
            fail_on: vec![0, 1, 2],
            calls: Cell::new(0),
        };
        let fetch = fetch_grid_discharge(&api, "http://unused", &batches(), &params()).unwrap();
        assert!(fetch.report.all_failed());
        assert!(fetch.frame.is_empty());
        assert_eq!(fetch.frame.columns(), GRID_DISCHARGE_VARIABLES);
    }

    #[test]
    fn test_short_response_fails_the_batch() {
        struct ShortApi;
        impl WeatherApi for ShortApi {
            fn fetch_daily(&self, _: &str, _: &DailyRequest) -> Result<Vec<LocationDaily>, FloodError> {
                let mut parsed = parse_daily_response(fixture_flood_batch_json())?;
                parsed.truncate(1);
                Ok(parsed)
            }
        }
        let fetch = fetch_grid_discharge(&ShortApi, "http://unused", &batches(), &params()).unwrap();
        assert_eq!(fetch.report.fetched, vec![2]);
        assert_eq!(fetch.report.failed.len(), 2);
    }
}
