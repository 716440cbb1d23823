//! Shared one-pass mean/variance and two-pass moment helpers.
//!
//! `WelfordAccumulator` is Welford's single-pass, numerically stable
//! mean/variance update, used by the streaming VaR/CVaR paths.  Skewness
//! and excess kurtosis follow the population-moment formulas in
//! `backtest_engine::extended_metrics::compute_skewness` /
//! `compute_excess_kurtosis` verbatim in shape.

#[derive(Debug, Clone, Default)]
pub struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n-1 denominator).
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count as f64 - 1.0)
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let mut w = WelfordAccumulator::new();
    for &v in values {
        w.update(v);
    }
    (w.mean(), w.std_dev())
}

pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 3.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let m2: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3: f64 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    let std = m2.sqrt();
    if std > 1e-15 {
        m3 / std.powi(3)
    } else {
        0.0
    }
}

pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 4.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let m2: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m4: f64 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    if m2 > 1e-15 {
        m4 / m2.powi(2) - 3.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_naive_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (mean, std) = mean_std(&values);
        let naive_mean = values.iter().sum::<f64>() / values.len() as f64;
        let naive_var = values.iter().map(|v| (v - naive_mean).powi(2)).sum::<f64>()
            / (values.len() as f64 - 1.0);
        assert!((mean - naive_mean).abs() < 1e-9);
        assert!((std * std - naive_var).abs() < 1e-9);
    }

    #[test]
    fn symmetric_distribution_has_near_zero_skew() {
        let values = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(skewness(&values).abs() < 1e-9);
    }

    #[test]
    fn short_series_returns_zero_not_panic() {
        assert_eq!(skewness(&[1.0]), 0.0);
        assert_eq!(excess_kurtosis(&[1.0, 2.0]), 0.0);
    }
}
