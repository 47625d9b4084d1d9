//! Explicit windowed statistics over indexable sequences.
//!
//! Every function is a plain pass over its input: no running accumulators are
//! kept between calls, so per-axis work can run in any order.

/// Median of a scratch buffer (reordered in place). Empty input yields NaN.
pub fn median_in_place(buf: &mut [f64]) -> f64 {
    let n = buf.len();
    if n == 0 {
        return f64::NAN;
    }
    buf.sort_by(|a, b| a.total_cmp(b));
    if n % 2 == 1 {
        buf[n / 2]
    } else {
        0.5 * (buf[n / 2 - 1] + buf[n / 2])
    }
}

/// Centered rolling median; windows are truncated at the edges.
pub fn centered_median(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half = window / 2;
    let mut scratch = Vec::with_capacity(window.max(1));
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            scratch.clear();
            scratch.extend_from_slice(&values[lo..hi]);
            median_in_place(&mut scratch)
        })
        .collect()
}

/// Centered rolling median, `None` wherever the full window does not fit.
pub fn centered_median_complete(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = window / 2;
    let mut scratch = Vec::with_capacity(window.max(1));
    (0..n)
        .map(|i| {
            if i < half || i + half >= n {
                return None;
            }
            scratch.clear();
            scratch.extend_from_slice(&values[i - half..=i + half]);
            Some(median_in_place(&mut scratch))
        })
        .collect()
}

/// Sample standard deviation (n-1) of a slice; 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Causal rolling standard deviation over the trailing `window` samples.
///
/// The first `window - 1` samples use every sample seen so far.
pub fn trailing_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            sample_std(&values[lo..=i])
        })
        .collect()
}
