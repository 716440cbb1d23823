//! VaR engine: Historical, Parametric, Monte Carlo, Streaming, Optimized.
//!
//! Historical is the textbook sort-and-index baseline (O(n log n), grounded
//! on `backtest_engine::statistical::percentile_sorted`'s sort-then-index
//! shape). Monte Carlo's RNG/percentile/summary shape is grounded on
//! `backtest_engine::monte_carlo::run_monte_carlo`. Streaming and Optimized
//! are the low-latency variants a streaming call site needs: O(n) single pass
//! with no allocation proportional to n (Streaming), and a reusable
//! sorted-insertion buffer (Optimized) per the "arenas/pools" design note.
//!
//! Every VaR value returned is a signed `Decimal`: loss is negative. All
//! five algorithms estimate the `alpha = (100 - confidence) / 100`
//! quantile of the *signed* return series directly, so this falls out
//! without any post-hoc sign flip.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{MonteCarloConfig, VarConfig};
use crate::decimal::Decimal;
use crate::error::{RiskError, RiskResult};
use crate::quantile::P2Estimator;
use crate::stats::{excess_kurtosis, mean_std, skewness, WelfordAccumulator};

pub const HISTORICAL_MIN_OBS: usize = 250;
pub const STREAMING_MIN_OBS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
    StreamingHistorical,
    OptimizedHistorical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub mean: Decimal,
    pub std_dev: Decimal,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloDetails {
    pub num_sims: u32,
    pub worst: Decimal,
    pub best: Decimal,
    pub simulated_pnls: Vec<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarResult {
    pub method: VarMethod,
    pub confidence: f64,
    pub var: Decimal,
    pub portfolio_value: Decimal,
    pub statistics: Statistics,
    pub monte_carlo_details: Option<MonteCarloDetails>,
    pub calculated_at: DateTime<Utc>,
}

impl VarResult {
    /// Magnitude of the loss, independent of sign convention.
    pub fn magnitude(&self) -> Decimal {
        self.var.abs()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_obs: usize,
    pub exceptions: usize,
    pub exception_rate: f64,
    pub expected_rate: f64,
    pub test_statistic: f64,
    pub is_valid: bool,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub returns: Vec<Decimal>,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentContribution {
    pub symbol: String,
    pub component_var: Decimal,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentVarResult {
    pub portfolio_var: Decimal,
    pub components: Vec<ComponentContribution>,
    /// Always `false`: this crate sums absolute per-position contributions
    /// without a covariance matrix, which overstates risk. Labelled
    /// honestly rather than fabricating a diversification benefit.
    pub diversified: bool,
    pub diversification_benefit: Decimal,
}

fn validate_confidence(confidence: f64) -> RiskResult<()> {
    if confidence > 0.0 && confidence < 100.0 {
        Ok(())
    } else {
        Err(RiskError::invalid_confidence(confidence))
    }
}

fn validate_portfolio_value(pv: Decimal) -> RiskResult<()> {
    if pv.is_positive() {
        Ok(())
    } else {
        Err(RiskError::invalid_portfolio(pv.to_f64()))
    }
}

fn validate_min_obs(returns: &[Decimal], min_obs: usize) -> RiskResult<()> {
    if returns.len() >= min_obs {
        Ok(())
    } else {
        Err(RiskError::insufficient_data(min_obs, returns.len()))
    }
}

/// `floor((1 - confidence/100) * n)` tail size, applied identically by VaR
/// and CVaR so the two stay consistent with each other.
pub fn tail_observation_count(confidence: f64, n: usize) -> usize {
    (((100.0 - confidence) / 100.0) * n as f64).floor() as usize
}

pub(crate) fn percentile_index(confidence: f64, n: usize) -> usize {
    let alpha = (100.0 - confidence) / 100.0;
    ((alpha) * (n - 1) as f64).floor() as usize
}

fn to_floats(returns: &[Decimal]) -> Vec<f64> {
    returns.iter().map(|d| d.to_f64()).collect()
}

fn statistics_from(returns: &[f64], fix_moments_to_zero: bool) -> Statistics {
    let (mean, std) = mean_std(returns);
    let (skew, kurt) = if fix_moments_to_zero {
        (0.0, 0.0)
    } else {
        (skewness(returns), excess_kurtosis(returns))
    };
    Statistics {
        mean: Decimal::from_f64(mean),
        std_dev: Decimal::from_f64(std),
        skewness: skew,
        kurtosis: kurt,
    }
}

/// Tail-probability z-score for the Gaussian VaR approximation.
/// Uses the documented small table for the three canonical confidence
/// levels (90/95/99) and falls back to `statrs`'s inverse normal CDF for
/// any other configured confidence.
pub(crate) fn gaussian_z(alpha: f64) -> f64 {
    const TABLE: [(f64, f64); 3] = [(0.01, -2.33), (0.05, -1.645), (0.10, -1.28)];
    for (a, z) in TABLE {
        if (alpha - a).abs() < 1e-9 {
            return z;
        }
    }
    use statrs::distribution::{ContinuousCDF, Normal};
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(alpha))
        .unwrap_or(-1.645)
}

pub struct VarEngine {
    pub config: VarConfig,
}

impl VarEngine {
    pub fn new(config: VarConfig) -> Self {
        VarEngine { config }
    }

    pub fn historical(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<VarResult> {
        validate_confidence(confidence)?;
        validate_portfolio_value(portfolio_value)?;
        validate_min_obs(returns, self.config.min_obs)?;

        let mut sorted = returns.to_vec();
        sorted.sort();
        let idx = percentile_index(confidence, sorted.len());
        let quantile_return = sorted[idx];
        let var = quantile_return.mul(portfolio_value);

        let floats = to_floats(returns);
        Ok(VarResult {
            method: VarMethod::Historical,
            confidence,
            var,
            portfolio_value,
            statistics: statistics_from(&floats, false),
            monte_carlo_details: None,
            calculated_at: Utc::now(),
        })
    }

    pub fn parametric(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<VarResult> {
        validate_confidence(confidence)?;
        validate_portfolio_value(portfolio_value)?;
        validate_min_obs(returns, self.config.min_obs)?;

        let floats = to_floats(returns);
        let (mean, std) = mean_std(&floats);
        let alpha = (100.0 - confidence) / 100.0;
        let z = gaussian_z(alpha);
        let quantile_return = mean + z * std;
        let var = Decimal::from_f64(quantile_return).mul(portfolio_value);

        Ok(VarResult {
            method: VarMethod::Parametric,
            confidence,
            var,
            portfolio_value,
            statistics: statistics_from(&floats, false),
            monte_carlo_details: None,
            calculated_at: Utc::now(),
        })
    }

    pub fn monte_carlo(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
        mc_config: &MonteCarloConfig,
    ) -> RiskResult<VarResult> {
        validate_confidence(confidence)?;
        validate_portfolio_value(portfolio_value)?;
        validate_min_obs(returns, self.config.min_obs)?;

        let floats = to_floats(returns);
        let (mean, std) = mean_std(&floats);
        let num_sims = mc_config.num_simulations.max(1);

        let mut rng = match mc_config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut draws = Vec::with_capacity(num_sims as usize);
        if mc_config.use_antithetic {
            while (draws.len() as u32) < num_sims {
                let z = box_muller(&mut rng);
                draws.push(z);
                if (draws.len() as u32) < num_sims {
                    draws.push(-z);
                }
            }
        } else {
            while (draws.len() as u32) < num_sims {
                draws.push(box_muller(&mut rng));
            }
        }

        let mut simulated_returns: Vec<f64> = draws.iter().map(|z| mean + std * z).collect();
        simulated_returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let idx = percentile_index(confidence, simulated_returns.len());
        let quantile_return = simulated_returns[idx];
        let var = Decimal::from_f64(quantile_return).mul(portfolio_value);

        let worst = Decimal::from_f64(simulated_returns[0]).mul(portfolio_value);
        let best =
            Decimal::from_f64(simulated_returns[simulated_returns.len() - 1]).mul(portfolio_value);
        let simulated_pnls: Vec<Decimal> = simulated_returns
            .iter()
            .map(|r| Decimal::from_f64(*r).mul(portfolio_value))
            .collect();

        Ok(VarResult {
            method: VarMethod::MonteCarlo,
            confidence,
            var,
            portfolio_value,
            statistics: statistics_from(&floats, false),
            monte_carlo_details: Some(MonteCarloDetails {
                num_sims,
                worst,
                best,
                simulated_pnls,
            }),
            calculated_at: Utc::now(),
        })
    }

    /// Single pass, O(n), no allocation proportional to n: feeds every
    /// return through a fresh P² estimator at `q = alpha` and a Welford
    /// accumulator. Skewness/kurtosis are fixed to zero, a deliberate
    /// trade-off for a single-pass call that must stay fast.
    pub fn streaming(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<VarResult> {
        validate_confidence(confidence)?;
        validate_portfolio_value(portfolio_value)?;
        validate_min_obs(returns, self.config.streaming_min_obs)?;

        let alpha = (100.0 - confidence) / 100.0;
        let mut p2 = P2Estimator::new(alpha);
        let mut welford = WelfordAccumulator::new();
        for r in returns {
            let f = r.to_f64();
            p2.update(f);
            welford.update(f);
        }

        let quantile_return = p2.quantile();
        let var = Decimal::from_f64(quantile_return).mul(portfolio_value);

        Ok(VarResult {
            method: VarMethod::StreamingHistorical,
            confidence,
            var,
            portfolio_value,
            statistics: Statistics {
                mean: Decimal::from_f64(welford.mean()),
                std_dev: Decimal::from_f64(welford.std_dev()),
                skewness: 0.0,
                kurtosis: 0.0,
            },
            monte_carlo_details: None,
            calculated_at: Utc::now(),
        })
    }

    /// Cache-friendly variant: maintains a sorted buffer via binary-search
    /// insertion in a pooled, reusable allocation instead of a fresh
    /// `sort()` per call.
    pub fn optimized(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
        pool: &mut SortedReturnsPool,
    ) -> RiskResult<VarResult> {
        validate_confidence(confidence)?;
        validate_portfolio_value(portfolio_value)?;
        validate_min_obs(returns, self.config.streaming_min_obs)?;

        pool.reset();
        pool.insert_all(returns);

        let idx = percentile_index(confidence, pool.len());
        let quantile_return = pool.at(idx);
        let var = Decimal::from_f64(quantile_return).mul(portfolio_value);

        let floats = to_floats(returns);
        Ok(VarResult {
            method: VarMethod::OptimizedHistorical,
            confidence,
            var,
            portfolio_value,
            statistics: statistics_from(&floats, false),
            monte_carlo_details: None,
            calculated_at: Utc::now(),
        })
    }

    /// Counts exceptions in an out-of-sample series against an
    /// already-computed VaR. The comparison is done per unit portfolio
    /// value so a backtest can reuse a VaR computed at a different
    /// reference portfolio value.
    pub fn backtest(
        &self,
        var_result: &VarResult,
        out_of_sample: &[Decimal],
        portfolio_value: Decimal,
    ) -> RiskResult<BacktestResult> {
        if out_of_sample.is_empty() {
            return Err(RiskError::insufficient_data(1, 0));
        }
        validate_portfolio_value(portfolio_value)?;

        let var_per_unit = var_result.var.checked_div(var_result.portfolio_value)?;
        let threshold = var_per_unit.mul(portfolio_value);

        let total_obs = out_of_sample.len();
        let exceptions = out_of_sample
            .iter()
            .filter(|r| r.mul(portfolio_value) < threshold)
            .count();
        let exception_rate = exceptions as f64 / total_obs as f64 * 100.0;
        let expected_rate = 100.0 - var_result.confidence;

        let p = (expected_rate / 100.0).clamp(1e-6, 1.0 - 1e-6);
        let se = (p * (1.0 - p) / total_obs as f64).sqrt();
        let test_statistic = if se > 0.0 {
            (exception_rate / 100.0 - p) / se
        } else {
            0.0
        };

        Ok(BacktestResult {
            total_obs,
            exceptions,
            exception_rate,
            expected_rate,
            test_statistic,
            is_valid: (exception_rate - expected_rate).abs() <= 5.0,
        })
    }

    /// Non-diversified component VaR: each position's Historical VaR at
    /// its weighted notional, summed by absolute value and negated.
    pub fn component_var(
        &self,
        positions: &[Position],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<ComponentVarResult> {
        if positions.is_empty() {
            return Err(RiskError::insufficient_data(1, 0));
        }
        validate_portfolio_value(portfolio_value)?;

        let mut components = Vec::with_capacity(positions.len());
        let mut sum_abs = Decimal::ZERO;
        for position in positions {
            let position_value = portfolio_value.mul(Decimal::from_f64(position.weight));
            let result = self.historical(&position.returns, position_value, confidence)?;
            sum_abs = sum_abs.add(result.var.abs());
            components.push(ComponentContribution {
                symbol: position.symbol.clone(),
                component_var: result.var,
                weight: position.weight,
            });
        }

        Ok(ComponentVarResult {
            portfolio_var: sum_abs.neg(),
            components,
            diversified: false,
            diversification_benefit: Decimal::ZERO,
        })
    }
}

fn box_muller(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Reusable sorted-insertion buffer for [`VarEngine::optimized`]. Checked
/// out, `reset`, used, and returned by the caller — never shared across
/// concurrent requests.
#[derive(Debug, Default)]
pub struct SortedReturnsPool {
    buf: Vec<f64>,
}

impl SortedReturnsPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        SortedReturnsPool {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn insert_all(&mut self, returns: &[Decimal]) {
        self.buf.reserve(returns.len());
        for r in returns {
            let f = r.to_f64();
            let pos = self.buf.partition_point(|&x| x < f);
            self.buf.insert(pos, f);
        }
    }

    pub fn at(&self, idx: usize) -> f64 {
        self.buf[idx]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returns_n(n: usize) -> Vec<Decimal> {
        // deterministic pseudo-returns spanning roughly [-0.1, 0.1]
        (0..n)
            .map(|i| {
                let x = ((i as f64) * 0.6180339887) % 1.0;
                Decimal::from_f64((x - 0.5) * 0.2)
            })
            .collect()
    }

    #[test]
    fn historical_matches_sorted_index_invariant() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(300);
        let pv = Decimal::from_i64(1_000_000);
        let result = engine.historical(&returns, pv, 95.0).unwrap();

        let mut sorted = returns.clone();
        sorted.sort();
        let idx = percentile_index(95.0, sorted.len());
        let expected = sorted[idx].mul(pv);
        assert_eq!(result.var, expected);
    }

    #[test]
    fn scenario_s1_ten_observations_via_streaming() {
        // Only 10 points here, below every engine's min_obs; exercise the
        // worked example directly against the sorted-index formula the
        // baseline uses.
        let returns: Vec<Decimal> = [
            -0.10, -0.08, -0.06, -0.05, -0.03, -0.02, 0.01, 0.02, 0.03, 0.04,
        ]
        .iter()
        .map(|v| Decimal::from_f64(*v))
        .collect();
        let mut sorted = returns.clone();
        sorted.sort();
        let idx95 = percentile_index(95.0, sorted.len());
        assert_eq!(idx95, 0);
        let pv = Decimal::from_i64(1_000_000);
        let var95 = sorted[idx95].mul(pv);
        assert!((var95.to_f64() - (-100_000.0)).abs() < 1.0);

        let idx90 = percentile_index(90.0, sorted.len());
        assert_eq!(idx90, 0);
    }

    #[test]
    fn insufficient_data_reports_expected_and_actual() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(50);
        let err = engine
            .historical(&returns, Decimal::from_i64(1_000_000), 95.0)
            .unwrap_err();
        assert_eq!(err.code, crate::error::RiskErrorCode::InsufficientData);
        assert_eq!(err.details.expected.unwrap(), "min_observations=250");
        assert_eq!(err.details.actual.unwrap(), "provided_observations=50");
    }

    #[test]
    fn invalid_confidence_is_rejected() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(300);
        let err = engine
            .historical(&returns, Decimal::from_i64(1_000_000), 105.0)
            .unwrap_err();
        assert_eq!(err.code, crate::error::RiskErrorCode::InvalidConfidence);
        assert_eq!(
            err.details.constraints.unwrap(),
            "0 < confidence < 100"
        );
    }

    #[test]
    fn scaling_linearity_holds_within_decimal_precision() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(300);
        let pv = Decimal::from_i64(1_000_000);
        let r1 = engine.historical(&returns, pv, 95.0).unwrap();
        let r2 = engine
            .historical(&returns, pv.mul(Decimal::from_i64(2)), 95.0)
            .unwrap();
        assert_eq!(r2.var, r1.var.mul(Decimal::from_i64(2)));
    }

    #[test]
    fn ninety_nine_percent_var_at_least_as_extreme_as_ninety_five() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(1000);
        let pv = Decimal::from_i64(1_000_000);
        let var95 = engine.historical(&returns, pv, 95.0).unwrap();
        let var99 = engine.historical(&returns, pv, 99.0).unwrap();
        assert!(var99.magnitude() >= var95.magnitude());
    }

    #[test]
    fn streaming_and_optimized_and_historical_agree_in_sign() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let historical = engine.historical(&returns, pv, 95.0).unwrap();
        let streaming = engine.streaming(&returns, pv, 95.0).unwrap();
        let mut pool = SortedReturnsPool::new();
        let optimized = engine.optimized(&returns, pv, 95.0, &mut pool).unwrap();
        assert!(historical.var.is_negative() || historical.var.is_zero());
        assert_eq!(streaming.var.is_negative(), historical.var.is_negative());
        assert_eq!(optimized.var.is_negative(), historical.var.is_negative());
    }

    #[test]
    fn monte_carlo_reports_worst_best_and_num_sims() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(400);
        let pv = Decimal::from_i64(1_000_000);
        let mc_config = MonteCarloConfig {
            num_simulations: 2000,
            random_seed: Some(7),
            ..MonteCarloConfig::default()
        };
        let result = engine
            .monte_carlo(&returns, pv, 95.0, &mc_config)
            .unwrap();
        let details = result.monte_carlo_details.unwrap();
        assert_eq!(details.num_sims, 2000);
        assert!(details.worst <= details.best);
        assert_eq!(details.simulated_pnls.len(), 2000);
    }

    #[test]
    fn backtest_exception_rate_is_in_bounds_and_consistent() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let var_result = engine.historical(&returns, pv, 95.0).unwrap();
        let out_of_sample = returns_n(200);
        let bt = engine.backtest(&var_result, &out_of_sample, pv).unwrap();
        assert!((0.0..=100.0).contains(&bt.exception_rate));
        assert_eq!(
            bt.exception_rate,
            bt.exceptions as f64 / bt.total_obs as f64 * 100.0
        );
    }

    #[test]
    fn component_var_is_labelled_non_diversified() {
        let engine = VarEngine::new(VarConfig::default());
        let positions = vec![
            Position {
                symbol: "AAA".into(),
                returns: returns_n(300),
                weight: 0.6,
            },
            Position {
                symbol: "BBB".into(),
                returns: returns_n(300),
                weight: 0.4,
            },
        ];
        let result = engine
            .component_var(&positions, Decimal::from_i64(1_000_000), 95.0)
            .unwrap();
        assert!(!result.diversified);
        assert_eq!(result.components.len(), 2);
        assert!(result.portfolio_var.is_negative());
    }
}
