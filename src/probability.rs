use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};

/// Natural logarithm of the binomial coefficient C(n, k), summed term by
/// term so it stays finite for large n.
fn ln_choose(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (1..=k)
        .map(|i| ((n - k + i) as f64).ln() - (i as f64).ln())
        .sum()
}

/// P(D = d) for D ~ Binomial(d_max, p)
pub fn binomial_pmf(d: usize, d_max: usize, p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PlanningError::Domain(format!(
            "binomial probability {p} outside [0, 1]"
        )));
    }
    if d > d_max {
        return Err(PlanningError::Domain(format!(
            "binomial value {d} outside [0, {d_max}]"
        )));
    }
    if p == 0.0 {
        return Ok(if d == 0 { 1.0 } else { 0.0 });
    }
    if p == 1.0 {
        return Ok(if d == d_max { 1.0 } else { 0.0 });
    }
    let ln_pmf = ln_choose(d_max, d)
        + d as f64 * p.ln()
        + (d_max - d) as f64 * (-p).ln_1p();
    Ok(ln_pmf.exp())
}

/// Complementary error function, Chebyshev fit with fractional error
/// below 1.2e-7 everywhere.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587
                                    + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// P(D = d) for a normal N(mu, sigma) rounded to the nearest integer and
/// truncated to [0, d_max], with the tails lumped into the end points.
pub fn discretized_normal_pmf(
    d: usize,
    mu: f64,
    sigma: f64,
    d_max: usize,
) -> Result<f64> {
    if !(sigma > 0.0) {
        return Err(PlanningError::Domain(format!(
            "normal standard deviation {sigma} must be positive"
        )));
    }
    if d > d_max {
        return Err(PlanningError::Domain(format!(
            "normal value {d} outside [0, {d_max}]"
        )));
    }
    if d_max == 0 {
        return Ok(1.0);
    }
    let phi = |v: f64| normal_cdf((v - mu) / sigma);
    let mass = if d == 0 {
        phi(0.5)
    } else if d == d_max {
        1.0 - phi(d_max as f64 - 0.5)
    } else {
        phi(d as f64 + 0.5) - phi(d as f64 - 0.5)
    };
    Ok(mass)
}

/// The distribution family of a random driver
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Binomial { p: f64 },
    DiscretizedNormal { mu: f64, sigma: f64 },
}

impl Distribution {
    pub fn pmf(&self, value: usize, max: usize) -> Result<f64> {
        match *self {
            Distribution::Binomial { p } => binomial_pmf(value, max, p),
            Distribution::DiscretizedNormal { mu, sigma } => {
                discretized_normal_pmf(value, mu, sigma, max)
            }
        }
    }

    /// Masses of every value in 0..=max
    pub fn table(&self, max: usize) -> Result<Vec<f64>> {
        (0..=max).map(|v| self.pmf(v, max)).collect()
    }

    /// Checks the parameters without evaluating any mass
    pub fn validate(&self) -> Result<()> {
        match *self {
            Distribution::Binomial { p } if !(0.0..=1.0).contains(&p) => Err(
                PlanningError::Domain(format!("binomial probability {p} outside [0, 1]")),
            ),
            Distribution::DiscretizedNormal { sigma, .. } if !(sigma > 0.0) => {
                Err(PlanningError::Domain(format!(
                    "normal standard deviation {sigma} must be positive"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_sums_to_one() {
        for &(n, p) in &[(0, 0.3), (1, 0.5), (10, 0.3), (40, 0.9), (200, 0.01)] {
            let total: f64 = (0..=n).map(|d| binomial_pmf(d, n, p).unwrap()).sum();
            assert!((total - 1.0).abs() < 1e-9, "n={n} p={p} total={total}");
        }
    }

    #[test]
    fn test_binomial_known_value() {
        // C(4,2) 0.5^4 = 6/16
        let v = binomial_pmf(2, 4, 0.5).unwrap();
        assert!((v - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_binomial_degenerate_probabilities() {
        assert_eq!(binomial_pmf(0, 5, 0.0).unwrap(), 1.0);
        assert_eq!(binomial_pmf(3, 5, 0.0).unwrap(), 0.0);
        assert_eq!(binomial_pmf(5, 5, 1.0).unwrap(), 1.0);
        assert_eq!(binomial_pmf(4, 5, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_binomial_domain_errors() {
        assert!(binomial_pmf(6, 5, 0.5).is_err());
        assert!(binomial_pmf(1, 5, 1.5).is_err());
        assert!(binomial_pmf(1, 5, -0.1).is_err());
    }

    #[test]
    fn test_discretized_normal_sums_to_one() {
        for &(mu, sigma, d_max) in &[(5.0, 2.0, 10), (0.0, 1.0, 3), (20.0, 0.5, 8)] {
            let total: f64 = (0..=d_max)
                .map(|d| discretized_normal_pmf(d, mu, sigma, d_max).unwrap())
                .sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_discretized_normal_zero_support() {
        assert_eq!(discretized_normal_pmf(0, 3.0, 1.0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_discretized_normal_domain_errors() {
        assert!(discretized_normal_pmf(1, 3.0, 0.0, 5).is_err());
        assert!(discretized_normal_pmf(1, 3.0, -1.0, 5).is_err());
        assert!(discretized_normal_pmf(6, 3.0, 1.0, 5).is_err());
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) + normal_cdf(-1.0) - 1.0).abs() < 1e-7);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-6);
    }

    #[test]
    fn test_distribution_table() {
        let table = Distribution::Binomial { p: 0.5 }.table(2).unwrap();
        assert_eq!(table.len(), 3);
        assert!((table[1] - 0.5).abs() < 1e-12);
        assert!(Distribution::DiscretizedNormal { mu: 1.0, sigma: 0.0 }
            .validate()
            .is_err());
    }
}
