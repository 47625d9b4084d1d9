// outlier.rs - Median/MAD outlier replacement, one axis at a time
//
// A sample is an outlier when its distance from the centered rolling median
// exceeds `threshold` times the local spread. The spread is the rolling median
// absolute deviation, floored by the typical step between neighbouring samples
// on either side so that smooth extrema are never mistaken for spikes. Only
// samples whose median and MAD windows are both complete are tested; the rest
// serve as anchors. Flagged samples are re-drawn from their nearest valid
// neighbours.

use ndarray::Array2;

use crate::config::TrackerConfig;
use crate::rolling::{centered_median_complete, median_in_place};
use crate::types::AXES;

/// Relative floor on the spread, for exactly flat stretches.
const ROUNDOFF: f64 = 1e-9;

/// Largest change, relative to the signal scale, treated as no change at all.
const SETTLE_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
pub struct OutlierCorrector {
    window: usize,
    threshold: f64,
}

impl OutlierCorrector {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            window: config.outlier_window,
            threshold: config.outlier_threshold,
        }
    }

    pub fn with_params(window: usize, threshold: f64) -> Self {
        Self { window, threshold }
    }

    /// Outlier flags for one axis.
    pub fn detect(&self, values: &[f64]) -> Vec<bool> {
        let n = values.len();
        let half = self.window / 2;
        let mut flags = vec![false; n];
        if half == 0 {
            return flags;
        }

        let medians = centered_median_complete(values, self.window);
        let residuals: Vec<Option<f64>> = values
            .iter()
            .zip(medians.iter())
            .map(|(x, m)| m.map(|m| (x - m).abs()))
            .collect();
        // steps[j] = |x[j+1] - x[j]|
        let steps: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).abs()).collect();

        let mut scratch = Vec::with_capacity(self.window);
        for i in 0..n {
            if i < 2 * half || i + 2 * half >= n {
                continue;
            }
            let (Some(dev), Some(median)) = (residuals[i], medians[i]) else {
                continue;
            };

            scratch.clear();
            scratch.extend(residuals[i - half..=i + half].iter().flatten());
            let mad = median_in_place(&mut scratch);

            // Steps that do not touch sample i
            scratch.clear();
            scratch.extend_from_slice(&steps[i - 2 * half..i - 1]);
            let left_step = median_in_place(&mut scratch);
            scratch.clear();
            scratch.extend_from_slice(&steps[i + 1..i + 2 * half]);
            let right_step = median_in_place(&mut scratch);

            let spread = mad
                .max(left_step)
                .max(right_step)
                .max(ROUNDOFF * median.abs().max(1.0));
            flags[i] = dev > self.threshold * spread;
        }
        flags
    }

    /// Replace outliers on one axis until detection finds nothing new.
    ///
    /// Flags accumulate across rounds and every round re-interpolates the
    /// original values, so the flagged set only grows and the loop ends after
    /// at most `values.len()` rounds. Running the result through again changes
    /// nothing. Returns the cleaned values and how many samples were replaced.
    pub fn correct_axis(&self, values: &[f64]) -> (Vec<f64>, usize) {
        let mut flagged = vec![false; values.len()];
        let mut current = values.to_vec();
        let mut rounds = 0;
        loop {
            let mut grew = false;
            for (acc, flag) in flagged.iter_mut().zip(self.detect(&current)) {
                if flag && !*acc {
                    *acc = true;
                    grew = true;
                }
            }
            if !grew {
                break;
            }
            let next = interpolate_flagged(values, &flagged);
            if settled(&current, &next) {
                break;
            }
            current = next;
            rounds += 1;
        }

        let replaced = current
            .iter()
            .zip(values.iter())
            .filter(|(a, b)| a != b)
            .count();
        if rounds > 1 {
            log::debug!("[OUTLIER] {} samples replaced over {} rounds", replaced, rounds);
        }
        (current, replaced)
    }

    /// Clean every axis of an N×3 position matrix independently.
    pub fn correct(&self, positions: &Array2<f64>) -> (Array2<f64>, [usize; AXES]) {
        let mut out = positions.clone();
        let mut replaced = [0usize; AXES];
        for axis in 0..AXES {
            let column = positions.column(axis).to_vec();
            let (cleaned, count) = self.correct_axis(&column);
            for (i, v) in cleaned.into_iter().enumerate() {
                out[[i, axis]] = v;
            }
            replaced[axis] = count;
        }
        log::debug!("[OUTLIER] replaced per axis: {:?}", replaced);
        (out, replaced)
    }
}

/// Linear interpolation over flagged samples using only unflagged anchors.
///
/// A flagged run touching either end is extrapolated from the two nearest valid
/// samples on the other side (held constant if only one exists). With no valid
/// sample at all the values are returned unchanged.
pub fn interpolate_flagged(values: &[f64], flags: &[bool]) -> Vec<f64> {
    let n = values.len();
    let valid: Vec<usize> = (0..n).filter(|&i| !flags[i]).collect();
    if valid.is_empty() {
        return values.to_vec();
    }

    let line = |a: usize, b: usize, i: usize| {
        let (xa, xb) = (values[a], values[b]);
        xa + (xb - xa) * (i as f64 - a as f64) / (b as f64 - a as f64)
    };

    let mut out = values.to_vec();
    for i in 0..n {
        if !flags[i] {
            continue;
        }
        // First valid index strictly after i
        let pos = valid.partition_point(|&v| v < i);
        let left = pos.checked_sub(1).map(|p| valid[p]);
        let right = valid.get(pos).copied();
        out[i] = match (left, right) {
            (Some(l), Some(r)) => line(l, r, i),
            (Some(l), None) => match pos.checked_sub(2).map(|p| valid[p]) {
                Some(l2) => line(l2, l, i),
                None => values[l],
            },
            (None, Some(r)) => match valid.get(pos + 1).copied() {
                Some(r2) => line(r, r2, i),
                None => values[r],
            },
            (None, None) => values[i],
        };
    }
    out
}

fn settled(current: &[f64], next: &[f64]) -> bool {
    let scale = current.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    current
        .iter()
        .zip(next)
        .all(|(a, b)| (a - b).abs() <= SETTLE_TOLERANCE * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp_with_spikes() -> Vec<f64> {
        let mut values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        values[7] += 50.0;
        values[12] -= 40.0;
        values
    }

    #[test]
    fn test_spikes_detected() {
        let corrector = OutlierCorrector::with_params(5, 3.0);
        let flags = corrector.detect(&ramp_with_spikes());
        let flagged: Vec<usize> = (0..20).filter(|&i| flags[i]).collect();
        assert_eq!(flagged, vec![7, 12]);
    }

    #[test]
    fn test_spikes_interpolated() {
        let corrector = OutlierCorrector::with_params(5, 3.0);
        let (cleaned, replaced) = corrector.correct_axis(&ramp_with_spikes());
        assert_eq!(replaced, 2);
        assert_abs_diff_eq!(cleaned[7], 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cleaned[12], 12.0, epsilon = 1e-12);
    }

    /// Deterministic uniform noise in [-0.5, 0.5).
    fn noise(seed: u64, n: usize) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    fn signal_families(n: usize) -> Vec<(&'static str, Vec<f64>)> {
        let jitter = noise(7, n);
        let plateau_jitter = noise(11, n);
        vec![
            (
                "smooth",
                (0..n)
                    .map(|i| 2.0 * (0.25 * i as f64).sin() + 0.001 * (i * i) as f64)
                    .collect(),
            ),
            (
                "noisy",
                (0..n).map(|i| (0.3 * i as f64).sin() + 0.1 * jitter[i]).collect(),
            ),
            (
                "plateau",
                (0..n)
                    .map(|i| {
                        let level = if i < 30 {
                            0.0
                        } else if i < 55 {
                            1.5
                        } else {
                            0.5
                        };
                        level + 0.02 * plateau_jitter[i]
                    })
                    .collect(),
            ),
        ]
    }

    #[test]
    fn test_cleaned_sequence_is_fixed_point() {
        for window in [3, 5, 7] {
            let corrector = OutlierCorrector::with_params(window, 3.0);
            for (name, clean) in signal_families(80) {
                let mut spiked = clean.clone();
                spiked[41] += 25.0;

                let (once, first) = corrector.correct_axis(&spiked);
                assert!(first >= 1, "{name} w={window}: spike not replaced");
                assert!((once[41] - clean[41]).abs() < 1.0, "{name} w={window}");

                let (twice, replaced) = corrector.correct_axis(&once);
                assert_eq!(replaced, 0, "{name} w={window}");
                assert_eq!(once, twice, "{name} w={window}");
            }
        }
    }

    #[test]
    fn test_clean_smooth_signal_untouched() {
        for frequency in [0.1, 0.3, 0.7, 1.3] {
            let values: Vec<f64> = (0..60).map(|i| (frequency * i as f64).sin()).collect();
            for window in [3, 5, 7, 9] {
                let corrector = OutlierCorrector::with_params(window, 3.0);
                assert!(corrector.detect(&values).iter().all(|&f| !f));
                let (cleaned, replaced) = corrector.correct_axis(&values);
                assert_eq!(replaced, 0, "f={frequency} w={window}");
                assert_eq!(cleaned, values);
            }
        }
    }

    #[test]
    fn test_spike_on_flat_stretch_flagged() {
        let mut values = vec![0.0; 12];
        values[6] = 100.0;
        let flags = OutlierCorrector::with_params(5, 3.0).detect(&values);
        let flagged: Vec<usize> = (0..12).filter(|&i| flags[i]).collect();
        assert_eq!(flagged, vec![6]);
    }

    #[test]
    fn test_edges_not_tested() {
        let corrector = OutlierCorrector::with_params(5, 3.0);
        let mut values = vec![0.0; 12];
        values[0] = 100.0;
        values[11] = -100.0;
        let flags = corrector.detect(&values);
        assert!(!flags[0] && !flags[11]);
    }

    #[test]
    fn test_interpolation_skips_other_outliers() {
        let values = [0.0, 1.0, 99.0, 99.0, 4.0];
        let flags = [false, false, true, true, false];
        let out = interpolate_flagged(&values, &flags);
        assert_abs_diff_eq!(out[2], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[3], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_extrapolation() {
        let values = [50.0, 2.0, 4.0, 6.0, -50.0];
        let flags = [true, false, false, false, true];
        let out = interpolate_flagged(&values, &flags);
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[4], 8.0, epsilon = 1e-12);

        let single = interpolate_flagged(&[3.0, 9.0], &[false, true]);
        assert_eq!(single, vec![3.0, 3.0]);

        let none = interpolate_flagged(&[1.0, 2.0], &[true, true]);
        assert_eq!(none, vec![1.0, 2.0]);
    }

    #[test]
    fn test_window_of_one_flags_nothing() {
        let corrector = OutlierCorrector::with_params(1, 3.0);
        assert!(corrector.detect(&ramp_with_spikes()).iter().all(|&f| !f));
    }
}
