//! Small descriptive statistics helpers.

/// Median of finite values (mean of the two middle values for even counts).
///
/// Non-finite values are ignored; returns `None` when nothing is left.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    median_mut(&mut v)
}

/// In-place median; sorts `values`.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Total sum of squares around the mean.
pub fn sum_sq_dev(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    values.iter().map(|v| (v - m) * (v - m)).sum()
}

/// Variance with `ddof` delta degrees of freedom (`Σ(x-m)² / (n - ddof)`).
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    Some(sum_sq_dev(values) / (n - ddof) as f64)
}

/// Round `v` to the nearest multiple of `step`.
pub fn round_to(v: f64, step: f64) -> f64 {
    (v / step).round() * step
}
