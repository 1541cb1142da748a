use super::types::{PercentileBand, ResultMatrix};

pub const DEFAULT_PERCENTILES: [f64; 5] = [15.0, 30.0, 50.0, 70.0, 85.0];

/// Percentage (0-100) of trials whose final portfolio value is still positive.
pub fn probability_of_success(results: &ResultMatrix) -> f64 {
    let trials = results.num_rows();
    if trials == 0 || results.num_cols() == 0 {
        return 0.0;
    }

    let successes = results
        .rows()
        .filter(|row| row.last().is_some_and(|v| *v > 0.0))
        .count();
    100.0 * successes as f64 / trials as f64
}

/// Column-wise percentiles across trials.
///
/// Each band is a synthetic envelope: its value for a year is that year's percentile
/// over all trials, not any single simulated path.
pub fn percentile_bands(results: &ResultMatrix, percentiles: &[f64]) -> Vec<PercentileBand> {
    let mut bands: Vec<PercentileBand> = percentiles
        .iter()
        .map(|p| PercentileBand {
            percentile: *p,
            values: Vec::with_capacity(results.num_cols()),
        })
        .collect();

    for col in 0..results.num_cols() {
        let mut column = results.column(col);
        for band in bands.iter_mut() {
            band.values.push(percentile(&mut column, band.percentile));
        }
    }

    bands
}

/// Linear-interpolated percentile; sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        // Bounded by the upper neighbour so rounding never breaks rank monotonicity.
        (values[lower] + (values[upper] - values[lower]) * w).min(values[upper])
    }
}
