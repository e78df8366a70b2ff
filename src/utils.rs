/// Helper function for evaluating the dot product between two vectors.
/// The slices are expected to have the same length.
///
/// ## Example
///
/// ```
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![1.0, 1.0, 1.0];
///
/// let dot = mpsched::utils::dot_product(&a, &b);
/// assert_eq!(dot, 6.0);
/// ```
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Arithmetic mean of a sample. Returns 0.0 for an empty sample.
///
/// ## Example
///
/// ```
/// let m = mpsched::utils::mean(&[1.0, 2.0, 3.0]);
/// assert_eq!(m, 2.0);
/// ```
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Returns 0.0 when there
/// are fewer than two values.
///
/// ## Example
///
/// ```
/// let s = mpsched::utils::std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
/// assert!((s - 2.138089935299395).abs() < 1e-12);
/// ```
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Ratio between two totals, defined as 1.0 when nothing was requested.
///
/// ## Example
///
/// ```
/// assert_eq!(mpsched::utils::ratio_or_one(5.0, 10.0), 0.5);
/// assert_eq!(mpsched::utils::ratio_or_one(0.0, 0.0), 1.0);
/// ```
pub fn ratio_or_one(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < f64::EPSILON {
        1.0
    } else {
        numerator / denominator
    }
}
