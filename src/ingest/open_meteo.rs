/// Open-Meteo daily API: URL construction and JSON response parsing.
///
/// Both the climate endpoint and the flood endpoint share one request and
/// response shape:
///   https://climate-api.open-meteo.com/v1/climate
///   https://flood-api.open-meteo.com/v1/flood
///
/// A single-location request returns one JSON object; a request with
/// comma-joined coordinates returns an array with one object per location,
/// in request order. See `fixtures.rs` for annotated examples.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

use crate::dataset::{DailyFrame, RowKey};
use crate::model::{Coordinate, FloodError};

// ---------------------------------------------------------------------------
// Serde structures for Open-Meteo JSON deserialization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseBody {
    Many(Vec<LocationPayload>),
    One(Box<LocationPayload>),
}

#[derive(Deserialize)]
struct LocationPayload {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    timezone_abbreviation: Option<String>,
    #[serde(default)]
    utc_offset_seconds: i32,
    daily: Option<DailyPayload>,
}

#[derive(Deserialize)]
struct DailyPayload {
    time: Vec<String>,
    /// One array per requested variable; `null` marks a missing day.
    #[serde(flatten)]
    values: HashMap<String, Vec<Option<f64>>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: bool,
    reason: String,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters of one daily-series request.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRequest {
    /// One or more points; several points become comma-joined lists.
    pub locations: Vec<Coordinate>,
    pub start_date: NaiveDate,
    /// Last day included in the response.
    pub end_date: NaiveDate,
    pub daily: Vec<String>,
    pub model: Option<String>,
}

impl DailyRequest {
    pub fn new(locations: Vec<Coordinate>, start_date: NaiveDate, end_date: NaiveDate, daily: &[&str]) -> Self {
        DailyRequest {
            locations,
            start_date,
            end_date,
            daily: daily.iter().map(|v| v.to_string()).collect(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

/// Builds the GET URL for a daily request. Dates are requested in GMT so
/// every `daily.time` entry is a UTC calendar day.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use flocast::ingest::open_meteo::{build_daily_url, DailyRequest};
/// use flocast::model::Coordinate;
///
/// let request = DailyRequest::new(
///     vec![Coordinate::new(12.59, 106.89)],
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
///     &["river_discharge"],
/// );
/// let url = build_daily_url("https://flood-api.open-meteo.com/v1/flood", &request);
/// assert!(url.contains("start_date=2024-01-01"));
/// ```
pub fn build_daily_url(base_url: &str, request: &DailyRequest) -> String {
    let latitudes = request
        .locations
        .iter()
        .map(|c| c.latitude.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let longitudes = request
        .locations
        .iter()
        .map(|c| c.longitude.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let daily = request.daily.join(",");

    let mut url = format!(
        "{}?latitude={}&longitude={}&start_date={}&end_date={}&daily={}&timezone=GMT",
        base_url,
        urlencoding::encode(&latitudes),
        urlencoding::encode(&longitudes),
        request.start_date.format("%Y-%m-%d"),
        request.end_date.format("%Y-%m-%d"),
        urlencoding::encode(&daily),
    );
    if let Some(model) = &request.model {
        url.push_str("&models=");
        url.push_str(&urlencoding::encode(model));
    }
    url
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Daily series for one location, as returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationDaily {
    /// Grid cell the provider snapped the request to.
    pub location: Coordinate,
    pub elevation: Option<f64>,
    pub timezone: Option<String>,
    pub timezone_abbreviation: Option<String>,
    pub utc_offset_seconds: i32,
    pub dates: Vec<NaiveDate>,
    pub values: HashMap<String, Vec<Option<f64>>>,
}

impl LocationDaily {
    /// Builds a frame with `variables` as columns, in that order.
    ///
    /// Rows are keyed by date alone, or by date and `location` when given.
    /// Grid callers pass the requested coordinate rather than the snapped one
    /// so that every generated point keeps its own identity.
    pub fn to_frame(&self, variables: &[&str], location: Option<Coordinate>) -> Result<DailyFrame, FloodError> {
        let columns = variables
            .iter()
            .map(|v| {
                let series = self
                    .values
                    .get(*v)
                    .ok_or_else(|| FloodError::MissingColumn(v.to_string()))?;
                if series.len() != self.dates.len() {
                    return Err(FloodError::ShapeMismatch(format!(
                        "'{}' has {} values for {} dates",
                        v,
                        series.len(),
                        self.dates.len()
                    )));
                }
                Ok(series)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut frame = DailyFrame::with_columns(variables);
        for (i, date) in self.dates.iter().enumerate() {
            let key = match location {
                Some(loc) => RowKey::at(*date, loc),
                None => RowKey::on(*date),
            };
            frame.push_row(key, columns.iter().map(|c| c[i]).collect())?;
        }
        Ok(frame)
    }

    /// Prints the site metadata block shown by the fetch stage.
    pub fn print_metadata(&self) {
        println!("   Coordinates {}", self.location);
        if let Some(elevation) = self.elevation {
            println!("   Elevation {} m asl", elevation);
        }
        println!(
            "   Timezone {} {}",
            self.timezone.as_deref().unwrap_or("GMT"),
            self.timezone_abbreviation.as_deref().unwrap_or("GMT")
        );
        println!("   Timezone difference to GMT+0 {} s", self.utc_offset_seconds);
    }
}

/// Extracts the provider's `reason` from an error body, if it is one.
pub fn parse_error_reason(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .filter(|e| e.error)
        .map(|e| e.reason)
}

/// Parses a daily response body into one `LocationDaily` per location.
///
/// # Errors
/// - `FloodError::ParseError`: malformed JSON, an error body, a location
///   without a `daily` block, or an unparseable date.
/// - `FloodError::NoDataAvailable`: an empty location array.
pub fn parse_daily_response(json: &str) -> Result<Vec<LocationDaily>, FloodError> {
    if let Some(reason) = parse_error_reason(json) {
        return Err(FloodError::ParseError(format!("API error body: {}", reason)));
    }

    let body: ResponseBody = serde_json::from_str(json)?;
    let payloads = match body {
        ResponseBody::Many(many) => many,
        ResponseBody::One(one) => vec![*one],
    };
    if payloads.is_empty() {
        return Err(FloodError::NoDataAvailable("response contains no locations".to_string()));
    }

    payloads.into_iter().map(parse_location).collect()
}

fn parse_location(payload: LocationPayload) -> Result<LocationDaily, FloodError> {
    let location = Coordinate::new(payload.latitude, payload.longitude);
    let daily = payload
        .daily
        .ok_or_else(|| FloodError::ParseError(format!("no daily block for {}", location)))?;

    let dates = daily
        .time
        .iter()
        .map(|t| {
            let day = t.get(..10).unwrap_or(t.as_str());
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map_err(|e| FloodError::ParseError(format!("bad date '{}': {}", t, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LocationDaily {
        location,
        elevation: payload.elevation,
        timezone: payload.timezone,
        timezone_abbreviation: payload.timezone_abbreviation,
        utc_offset_seconds: payload.utc_offset_seconds,
        dates,
        values: daily.values,
    })
}
