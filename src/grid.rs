/// Rectangular coordinate grid around a center point, and its partition into
/// fixed-size request batches.
///
/// Degree shifts use a flat approximation: 111 km per degree of latitude and
/// `111 * cos(latitude)` km per degree of longitude at the center.

use serde::{Deserialize, Serialize};

use crate::model::{Coordinate, FloodError};

pub const KM_PER_DEGREE_LATITUDE: f64 = 111.0;

/// ~100 m at mid latitudes.
pub const DEFAULT_STEP_DEGREES: f64 = 0.0009;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub center: Coordinate,
    /// Distance from the center to each edge, in km.
    pub half_extent_km: f64,
    /// Spacing between neighbouring points on both axes, in degrees.
    pub step_degrees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GridSpec {
    pub fn new(center: Coordinate, half_extent_km: f64) -> Self {
        GridSpec {
            center,
            half_extent_km,
            step_degrees: DEFAULT_STEP_DEGREES,
        }
    }

    pub fn bounds(&self) -> GridBounds {
        let lat_shift = self.half_extent_km / KM_PER_DEGREE_LATITUDE;
        let lon_shift =
            self.half_extent_km / (KM_PER_DEGREE_LATITUDE * self.center.latitude.to_radians().cos());
        GridBounds {
            north: self.center.latitude + lat_shift,
            south: self.center.latitude - lat_shift,
            east: self.center.longitude + lon_shift,
            west: self.center.longitude - lon_shift,
        }
    }

    fn validate(&self) -> Result<(), FloodError> {
        if !(self.step_degrees > 0.0) {
            return Err(FloodError::Config(format!("grid step must be positive, got {}", self.step_degrees)));
        }
        if !(self.half_extent_km >= 0.0) {
            return Err(FloodError::Config(format!(
                "grid half extent must be non-negative, got {}",
                self.half_extent_km
            )));
        }
        if self.center.latitude.abs() >= 90.0 {
            return Err(FloodError::Config(format!(
                "grid center latitude {} has no longitude extent",
                self.center.latitude
            )));
        }
        Ok(())
    }
}

/// Points along one axis: `ceil(span / step) + 1`, starting at `start`.
/// The epsilon keeps a span that is an exact multiple of the step from
/// gaining a point through rounding noise.
pub fn axis_points(start: f64, span: f64, step: f64) -> Vec<f64> {
    let n = (span / step - 1e-9).ceil().max(0.0) as usize + 1;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// All grid points, latitude-major: every longitude of the southernmost row
/// first, then the next row north.
pub fn generate_grid(spec: &GridSpec) -> Result<Vec<Coordinate>, FloodError> {
    spec.validate()?;
    let b = spec.bounds();
    let latitudes = axis_points(b.south, b.north - b.south, spec.step_degrees);
    let longitudes = axis_points(b.west, b.east - b.west, spec.step_degrees);

    Ok(latitudes
        .iter()
        .flat_map(|&lat| longitudes.iter().map(move |&lon| Coordinate::new(lat, lon)))
        .collect())
}

/// Consecutive batches of at most `batch_size` items: starts at 0, stride
/// `batch_size`, so every item lands in exactly one batch.
pub fn partition_batches<T: Clone>(items: &[T], batch_size: usize) -> Result<Vec<Vec<T>>, FloodError> {
    if batch_size == 0 {
        return Err(FloodError::Config("batch size must be at least 1".to_string()));
    }
    Ok(items.chunks(batch_size).map(|c| c.to_vec()).collect())
}
