/// Test fixtures: representative JSON payloads from the Open-Meteo daily APIs.
///
/// These fixtures are structurally complete but truncated to a few days.
/// They reflect the envelope returned by:
///   https://climate-api.open-meteo.com/v1/climate?...&timezone=GMT
///   https://flood-api.open-meteo.com/v1/flood?...&timezone=GMT
///
/// Open-Meteo response shape (one object per location):
///   .latitude / .longitude   snapped grid cell, not the requested point
///   .elevation               metres above sea level
///   .utc_offset_seconds      0 for GMT
///   .daily_units             unit per variable (ignored by the parser)
///   .daily.time[]            ISO dates, one per day
///   .daily.<variable>[]      one number per day, `null` when missing
///
/// Multi-location requests return a JSON array of such objects in request
/// order. Errors come back as `{"error": true, "reason": "..."}` with HTTP 400.

/// Single climate site (Kratie province model cell), three days, one
/// missing precipitation value.
#[cfg(test)]
pub(crate) fn fixture_climate_single_json() -> &'static str {
    r#"{
      "latitude": 12.6,
      "longitude": 106.9,
      "generationtime_ms": 0.8,
      "utc_offset_seconds": 0,
      "timezone": "GMT",
      "timezone_abbreviation": "GMT",
      "elevation": 52.0,
      "daily_units": {
        "time": "iso8601",
        "temperature_2m_mean": "°C",
        "precipitation_sum": "mm"
      },
      "daily": {
        "time": ["2024-01-01", "2024-01-02", "2024-01-03"],
        "temperature_2m_mean": [26.1, 26.4, 25.9],
        "temperature_2m_max": [31.2, 32.0, 30.8],
        "temperature_2m_min": [21.5, 22.0, 21.7],
        "relative_humidity_2m_mean": [68.0, 71.5, 74.2],
        "precipitation_sum": [0.0, null, 12.4],
        "soil_moisture_0_to_10cm_mean": [0.21, 0.2, 0.26]
      }
    }"#
}

/// Single discharge site, same three days as the climate fixture.
#[cfg(test)]
pub(crate) fn fixture_discharge_single_json() -> &'static str {
    r#"{
      "latitude": 12.575,
      "longitude": 106.875,
      "generationtime_ms": 0.4,
      "utc_offset_seconds": 0,
      "timezone": "GMT",
      "timezone_abbreviation": "GMT",
      "elevation": 0.0,
      "daily_units": { "time": "iso8601", "river_discharge": "m³/s" },
      "daily": {
        "time": ["2024-01-01", "2024-01-02", "2024-01-03"],
        "river_discharge": [4210.5, 4188.0, 4302.7]
      }
    }"#
}

/// Two-point grid batch from the flood endpoint. The second point's
/// ensemble mean crosses the major-flood threshold on 2024-06-01.
#[cfg(test)]
pub(crate) fn fixture_flood_batch_json() -> &'static str {
    r#"[
      {
        "latitude": 20.075,
        "longitude": 77.725,
        "utc_offset_seconds": 0,
        "timezone": "GMT",
        "timezone_abbreviation": "GMT",
        "elevation": 0.0,
        "daily": {
          "time": ["2024-05-31", "2024-06-01"],
          "river_discharge": [3.2, 4.1],
          "river_discharge_mean": [3.0, 4.4],
          "river_discharge_max": [5.5, 7.9],
          "river_discharge_min": [1.1, 1.4]
        }
      },
      {
        "latitude": 20.125,
        "longitude": 77.725,
        "utc_offset_seconds": 0,
        "timezone": "GMT",
        "timezone_abbreviation": "GMT",
        "elevation": 0.0,
        "daily": {
          "time": ["2024-05-31", "2024-06-01"],
          "river_discharge": [12.0, 35.2],
          "river_discharge_mean": [11.8, 31.5],
          "river_discharge_max": [19.0, 48.3],
          "river_discharge_min": [6.2, null]
        }
      }
    ]"#
}

#[cfg(test)]
pub(crate) fn fixture_api_error_json() -> &'static str {
    r#"{"error": true, "reason": "Parameter 'start_date' is out of allowed range"}"#
}
