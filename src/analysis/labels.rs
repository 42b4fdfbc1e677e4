/// Quantile-threshold flood labels for training.
///
/// The threshold is computed once per training run over the full historical
/// discharge column, never per fold. Cross-validation scores therefore
/// measure generalization under a fixed, data-derived threshold.

use crate::model::FloodError;

/// Discharge quantile above which a day is labeled flood-positive.
pub const FLOOD_QUANTILE: f64 = 0.95;

/// Sample quantile with linear interpolation between closest ranks
/// (position `q * (n - 1)` in the sorted values). NaNs are ignored.
///
/// Returns `None` for an empty input or `q` outside `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Computes the flood threshold over all present discharge values.
pub fn flood_threshold(discharge: &[Option<f64>], q: f64) -> Result<f64, FloodError> {
    let present: Vec<f64> = discharge.iter().flatten().copied().collect();
    quantile(&present, q).ok_or(FloodError::InsufficientData {
        operation: "flood threshold",
        required: 1,
        available: 0,
    })
}

/// `flood_occurred = discharge > threshold`; missing discharge is negative.
pub fn label_flood_occurred(discharge: &[Option<f64>], threshold: f64) -> Vec<bool> {
    discharge
        .iter()
        .map(|d| matches!(d, Some(v) if *v > threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_of_one_to_hundred() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let q95 = quantile(&values, 0.95).unwrap();
        assert!((q95 - 95.05).abs() < 1e-9, "got {}", q95);
    }

    #[test]
    fn test_quantile_edges() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[1.0, 2.0], 1.5), None);
        assert_eq!(quantile(&[7.0], 0.95), Some(7.0));
        assert_eq!(quantile(&[3.0, 1.0, 2.0], 0.0), Some(1.0));
        assert_eq!(quantile(&[3.0, 1.0, 2.0], 1.0), Some(3.0));
        assert_eq!(quantile(&[1.0, f64::NAN, 3.0], 0.5), Some(2.0));
    }

    #[test]
    fn test_five_percent_labeled_on_hundred_values() {
        let discharge: Vec<Option<f64>> = (1..=100).map(|v| Some(v as f64)).collect();
        let threshold = flood_threshold(&discharge, FLOOD_QUANTILE).unwrap();
        let labels = label_flood_occurred(&discharge, threshold);

        assert_eq!(labels.iter().filter(|&&l| l).count(), 5);
        assert!(labels[95..].iter().all(|&l| l), "96..=100 should be flood days");
    }

    #[test]
    fn test_single_spike_is_the_only_flood() {
        let mut discharge = vec![Some(5.0); 9];
        discharge.push(Some(50.0));

        let threshold = flood_threshold(&discharge, FLOOD_QUANTILE).unwrap();
        assert!(threshold > 5.0 && threshold < 50.0, "threshold {}", threshold);

        let labels = label_flood_occurred(&discharge, threshold);
        assert_eq!(labels.iter().filter(|&&l| l).count(), 1);
        assert!(labels[9]);
    }

    #[test]
    fn test_missing_discharge_is_not_a_flood() {
        let discharge = vec![Some(1.0), None, Some(100.0)];
        let threshold = flood_threshold(&discharge, 0.5).unwrap();
        assert_eq!(label_flood_occurred(&discharge, threshold), vec![false, false, true]);
    }

    #[test]
    fn test_threshold_requires_values() {
        let err = flood_threshold(&[None, None], FLOOD_QUANTILE).unwrap_err();
        assert!(matches!(err, FloodError::InsufficientData { .. }));
    }
}
