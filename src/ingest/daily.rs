/// Single-site daily fetchers for the climate model series and the river
/// discharge series.
///
/// Both return a date-keyed frame whose columns are the requested variables
/// in request order. Any failure aborts the caller's run.

use chrono::NaiveDate;

use super::client::WeatherApi;
use super::open_meteo::{DailyRequest, LocationDaily};
use crate::dataset::DailyFrame;
use crate::logging::{self, DataSource};
use crate::model::{Coordinate, FloodError, CLIMATE_VARIABLES, VAR_RIVER_DISCHARGE};

/// One site's frame plus the response metadata it came with.
#[derive(Debug, Clone)]
pub struct SiteSeries {
    pub site: LocationDaily,
    pub frame: DailyFrame,
}

/// Fetches the daily climate variables (temperature mean/max/min, humidity,
/// precipitation, soil moisture) for one site.
pub fn fetch_daily_climate(
    api: &dyn WeatherApi,
    base_url: &str,
    site: Coordinate,
    model: Option<&str>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<SiteSeries, FloodError> {
    let mut request = DailyRequest::new(vec![site], start_date, end_date, CLIMATE_VARIABLES);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    fetch_site(api, base_url, &request, CLIMATE_VARIABLES).inspect_err(|e| {
        logging::log_fetch_failure(DataSource::Climate, &site.to_string(), "daily climate fetch", e);
    })
}

/// Fetches daily river discharge for one site.
pub fn fetch_daily_discharge(
    api: &dyn WeatherApi,
    base_url: &str,
    site: Coordinate,
    model: Option<&str>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<SiteSeries, FloodError> {
    let mut request = DailyRequest::new(vec![site], start_date, end_date, &[VAR_RIVER_DISCHARGE]);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    fetch_site(api, base_url, &request, &[VAR_RIVER_DISCHARGE]).inspect_err(|e| {
        logging::log_fetch_failure(DataSource::Flood, &site.to_string(), "daily discharge fetch", e);
    })
}

fn fetch_site(
    api: &dyn WeatherApi,
    base_url: &str,
    request: &DailyRequest,
    variables: &[&str],
) -> Result<SiteSeries, FloodError> {
    if request.start_date > request.end_date {
        return Err(FloodError::Config(format!(
            "start date {} is after end date {}",
            request.start_date, request.end_date
        )));
    }

    let site = api
        .fetch_daily(base_url, request)?
        .into_iter()
        .next()
        .ok_or_else(|| FloodError::NoDataAvailable("response contains no locations".to_string()))?;

    let frame = site.to_frame(variables, None)?;
    if frame.is_empty() {
        return Err(FloodError::NoDataAvailable(format!(
            "no days between {} and {}",
            request.start_date, request.end_date
        )));
    }
    if let Some(last) = frame.keys().last() {
        if last.date > request.end_date {
            return Err(FloodError::ShapeMismatch(format!(
                "response runs past the requested end date ({} > {})",
                last.date, request.end_date
            )));
        }
    }

    tracing::info!(
        site = %site.location,
        days = frame.len(),
        variables = variables.len(),
        "fetched daily series"
    );
    Ok(SiteSeries { site, frame })
}
