/// Open-Meteo data ingestion.
///
/// Submodules:
/// - `open_meteo`: URL construction + JSON parsing shared by both endpoints.
/// - `client`: the `WeatherApi` seam and the retrying, caching HTTP client.
/// - `daily`: single-site climate and discharge fetchers.
/// - `grid_batch`: batched grid discharge fetch with per-batch failure skip.

pub mod client;
pub mod daily;
pub mod grid_batch;
pub mod open_meteo;

#[cfg(test)]
pub(crate) mod fixtures;
