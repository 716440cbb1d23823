//! CVaR (Expected Shortfall) engine, reusing the VaR engine for thresholds.
//!
//! Historical CVaR's "sort, take the worst tail, average" shape is grounded
//! on `backtest_engine::advanced_risk::conditional_drawdown_at_risk`, which
//! sorts an equity curve's drawdowns descending and averages the worst
//! alpha% — the same operation, mirrored for a return series sorted
//! ascending.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::config::CVarConfig;
use crate::decimal::Decimal;
use crate::error::{RiskError, RiskResult};
use crate::stats::{mean_std, skewness};
use crate::var::{VarEngine, VarResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailStatistics {
    pub tail_obs_count: usize,
    pub avg_tail_loss: Decimal,
    pub worst_tail_loss: Decimal,
    pub tail_volatility: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailAnalysis {
    pub tail_returns: Vec<Decimal>,
    pub tail_mean: Decimal,
    pub tail_volatility: Decimal,
    pub tail_skewness: f64,
    pub extreme_value_index: f64,
}

/// Monte Carlo CVaR's extra `{tail_scenarios, worst, best}` report,
/// additional to the `tail_statistics` shape every variant shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McCVarDetails {
    pub tail_scenarios: usize,
    pub worst: Decimal,
    pub best: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVarResult {
    #[serde(flatten)]
    pub var: VarResult,
    pub cvar: Decimal,
    pub tail_statistics: TailStatistics,
    pub tail_analysis: Option<TailAnalysis>,
    pub mc_details: Option<McCVarDetails>,
}

impl CVarResult {
    pub fn magnitude(&self) -> Decimal {
        self.cvar.abs()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenarioResult {
    pub name: String,
    pub result: CVarResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    pub scenarios: Vec<StressScenarioResult>,
    pub worst_case_cvar: Decimal,
    pub average_cvar_magnitude: Decimal,
}

fn decimal_mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum = values.iter().fold(Decimal::ZERO, |acc, v| acc.add(*v));
    sum.checked_div(Decimal::from_i64(values.len() as i64))
        .unwrap_or(Decimal::ZERO)
}

/// Hill estimator for the tail index, applied to the absolute tail losses
/// (already sorted with the worst loss first, since `tail` comes from a
/// slice sorted ascending by signed return).
fn hill_estimator(tail_losses_abs_desc: &[f64]) -> f64 {
    let k = tail_losses_abs_desc.len();
    if k < 2 {
        return 0.0;
    }
    let threshold = tail_losses_abs_desc[k - 1].max(1e-12);
    let sum: f64 = tail_losses_abs_desc[..k - 1]
        .iter()
        .map(|x| (x.max(1e-12) / threshold).ln())
        .sum();
    sum / (k as f64 - 1.0)
}

pub struct CVarEngine {
    pub var_engine: VarEngine,
    pub config: CVarConfig,
}

impl CVarEngine {
    pub fn new(config: CVarConfig) -> Self {
        let var_engine = VarEngine::new(config.var.clone());
        CVarEngine { var_engine, config }
    }

    fn build_tail_analysis(&self, tail: &[Decimal]) -> TailAnalysis {
        let tail_floats: Vec<f64> = tail.iter().map(|d| d.to_f64()).collect();
        let (tail_mean_f, tail_std_f) = mean_std(&tail_floats);
        let abs_desc: Vec<f64> = tail_floats.iter().map(|v| v.abs()).collect();
        TailAnalysis {
            tail_returns: tail.to_vec(),
            tail_mean: Decimal::from_f64(tail_mean_f),
            tail_volatility: Decimal::from_f64(tail_std_f),
            tail_skewness: skewness(&tail_floats),
            extreme_value_index: hill_estimator(&abs_desc),
        }
    }

    /// Reuses Historical VaR for the threshold index; the tail is
    /// `sorted[0..=threshold_index]`. Enforces the coherence invariant by
    /// clamping `cvar := var` (same sign) if the raw tail mean would be
    /// less extreme than VaR.
    pub fn historical(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<CVarResult> {
        let var_result = self.var_engine.historical(returns, portfolio_value, confidence)?;

        let mut sorted = returns.to_vec();
        sorted.sort();
        let threshold_idx = crate::var::percentile_index(confidence, sorted.len());
        let tail = &sorted[0..=threshold_idx];

        let tail_mean = decimal_mean(tail);
        let mut cvar = tail_mean.mul(portfolio_value);
        if cvar.abs() < var_result.var.abs() {
            cvar = var_result.var;
        }

        let tail_floats: Vec<f64> = tail.iter().map(|d| d.to_f64()).collect();
        let (_, tail_std_f) = mean_std(&tail_floats);

        let tail_statistics = TailStatistics {
            tail_obs_count: tail.len(),
            avg_tail_loss: cvar,
            worst_tail_loss: tail[0].mul(portfolio_value),
            tail_volatility: Decimal::from_f64(tail_std_f).mul(portfolio_value),
        };

        let tail_analysis = self
            .config
            .enable_tail_analysis
            .then(|| self.build_tail_analysis(tail));

        Ok(CVarResult {
            var: var_result,
            cvar,
            tail_statistics,
            tail_analysis,
            mc_details: None,
        })
    }

    /// Closed-form Gaussian CVaR: `mu - sigma * phi(z) / alpha`. The
    /// `parametric_cvar_approx` multiplier form is kept only as a
    /// test/back-compat fallback.
    ///
    /// Subtraction, not addition: `phi(z) > 0` and this crate's convention
    /// is loss-as-negative (`var.rs` module docs), so the expected-shortfall
    /// term must pull the mean further negative, matching `parametric()`'s
    /// own `mean + z*std` with `z < 0` for the same tail.
    pub fn parametric(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<CVarResult> {
        let var_result = self.var_engine.parametric(returns, portfolio_value, confidence)?;

        let floats: Vec<f64> = returns.iter().map(|d| d.to_f64()).collect();
        let (mean, std) = mean_std(&floats);
        let alpha = (100.0 - confidence) / 100.0;
        let z = crate::var::gaussian_z(alpha);
        let normal = Normal::new(0.0, 1.0).expect("standard normal is always valid");
        let phi_z = normal.pdf(z);
        let cvar_return = mean - std * phi_z / alpha;
        let mut cvar = Decimal::from_f64(cvar_return).mul(portfolio_value);
        if cvar.abs() < var_result.var.abs() {
            cvar = var_result.var;
        }

        Ok(CVarResult {
            var: var_result.clone(),
            cvar,
            tail_statistics: TailStatistics {
                tail_obs_count: ((alpha) * returns.len() as f64).floor() as usize,
                avg_tail_loss: cvar,
                worst_tail_loss: cvar,
                tail_volatility: var_result.statistics.std_dev.mul(portfolio_value),
            },
            tail_analysis: None,
            mc_details: None,
        })
    }

    /// A simpler multiplier-based approximation, kept as a fallback for
    /// tests that assert against the original heuristic.
    pub fn parametric_cvar_approx(var: Decimal) -> Decimal {
        var.mul(Decimal::from_f64(1.3))
    }

    /// Sorts simulated P&Ls and averages the lowest
    /// `floor((1-c/100)*N)+1` of them.
    pub fn monte_carlo(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
        mc_config: &crate::config::MonteCarloConfig,
    ) -> RiskResult<CVarResult> {
        let var_result = self
            .var_engine
            .monte_carlo(returns, portfolio_value, confidence, mc_config)?;
        let details = var_result
            .monte_carlo_details
            .clone()
            .ok_or_else(|| RiskError::new(crate::error::RiskErrorCode::CalculationFailed))?;

        let n = details.simulated_pnls.len();
        let tail_size = ((((100.0 - confidence) / 100.0) * n as f64).floor() as usize + 1)
            .clamp(1, n);
        let tail = &details.simulated_pnls[0..tail_size];

        let mut cvar = decimal_mean(tail);
        if cvar.abs() < var_result.var.abs() {
            cvar = var_result.var;
        }

        let tail_floats: Vec<f64> = tail.iter().map(|d| d.to_f64()).collect();
        let (_, tail_std_f) = mean_std(&tail_floats);

        Ok(CVarResult {
            var: var_result,
            cvar,
            tail_statistics: TailStatistics {
                tail_obs_count: tail.len(),
                avg_tail_loss: cvar,
                worst_tail_loss: tail[0],
                tail_volatility: Decimal::from_f64(tail_std_f),
            },
            tail_analysis: self.config.enable_tail_analysis.then(|| self.build_tail_analysis(tail)),
            mc_details: Some(McCVarDetails {
                tail_scenarios: tail.len(),
                worst: tail[0],
                best: tail[tail.len() - 1],
            }),
        })
    }

    /// Estimates the VaR quantile with P² in one pass, then a second pass
    /// over the same borrowed slice accumulates count/sum/sum-of-squares
    /// for observations at or below the threshold — still a single O(n)
    /// walk overall.
    pub fn streaming(
        &self,
        returns: &[Decimal],
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<CVarResult> {
        let var_result = self.var_engine.streaming(returns, portfolio_value, confidence)?;
        let threshold_return = var_result.var.checked_div(portfolio_value)?.to_f64();

        let mut count = 0u64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut worst = f64::INFINITY;
        for r in returns {
            let f = r.to_f64();
            if f <= threshold_return {
                count += 1;
                sum += f;
                sum_sq += f * f;
                worst = worst.min(f);
            }
        }

        let tail_mean_f = if count > 0 {
            sum / count as f64
        } else {
            threshold_return
        };
        let tail_var_f = if count > 0 {
            (sum_sq / count as f64 - tail_mean_f * tail_mean_f).max(0.0)
        } else {
            0.0
        };

        let mut cvar = Decimal::from_f64(tail_mean_f).mul(portfolio_value);
        if cvar.abs() < var_result.var.abs() {
            cvar = var_result.var;
        }
        let worst_val = if worst.is_finite() { worst } else { threshold_return };

        Ok(CVarResult {
            var: var_result,
            cvar,
            tail_statistics: TailStatistics {
                tail_obs_count: count as usize,
                avg_tail_loss: cvar,
                worst_tail_loss: Decimal::from_f64(worst_val).mul(portfolio_value),
                tail_volatility: Decimal::from_f64(tail_var_f.sqrt()).mul(portfolio_value),
            },
            tail_analysis: None,
            mc_details: None,
        })
    }

    /// Runs Historical CVaR on each named scenario; reports the worst-case
    /// CVaR and the average CVaR magnitude across scenarios.
    pub fn stress(
        &self,
        scenarios: &BTreeMap<String, Vec<Decimal>>,
        portfolio_value: Decimal,
        confidence: f64,
    ) -> RiskResult<StressResult> {
        if scenarios.is_empty() {
            return Err(RiskError::insufficient_data(1, 0));
        }
        let mut results = Vec::with_capacity(scenarios.len());
        for (name, returns) in scenarios {
            let result = self.historical(returns, portfolio_value, confidence)?;
            results.push(StressScenarioResult {
                name: name.clone(),
                result,
            });
        }

        let worst_case_cvar = results
            .iter()
            .map(|s| s.result.cvar)
            .fold(Decimal::ZERO, |worst, cvar| {
                if cvar.abs() > worst.abs() {
                    cvar
                } else {
                    worst
                }
            });

        let total = results
            .iter()
            .fold(Decimal::ZERO, |acc, s| acc.add(s.result.cvar.abs()));
        let average_cvar_magnitude = total
            .checked_div(Decimal::from_i64(results.len() as i64))
            .unwrap_or(Decimal::ZERO);

        Ok(StressResult {
            scenarios: results,
            worst_case_cvar,
            average_cvar_magnitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CVarConfig, MonteCarloConfig};

    fn returns_n(n: usize) -> Vec<Decimal> {
        (0..n)
            .map(|i| {
                let x = ((i as f64) * 0.6180339887) % 1.0;
                Decimal::from_f64((x - 0.5) * 0.2)
            })
            .collect()
    }

    #[test]
    fn coherence_invariant_cvar_at_least_as_extreme_as_var() {
        let engine = CVarEngine::new(CVarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let result = engine.historical(&returns, pv, 95.0).unwrap();
        assert!(result.cvar.abs() >= result.var.var.abs());
    }

    #[test]
    fn streaming_cvar_is_coherent_too() {
        let engine = CVarEngine::new(CVarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let result = engine.streaming(&returns, pv, 95.0).unwrap();
        assert!(result.cvar.abs() >= result.var.var.abs());
    }

    #[test]
    fn parametric_cvar_matches_var_sign_and_is_more_extreme() {
        let engine = CVarEngine::new(CVarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let result = engine.parametric(&returns, pv, 95.0).unwrap();
        assert_eq!(result.cvar.is_negative(), result.var.var.is_negative());
        assert!(result.cvar.abs() >= result.var.var.abs());
    }

    #[test]
    fn monte_carlo_cvar_reports_tail_scenarios() {
        let engine = CVarEngine::new(CVarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let mc_config = MonteCarloConfig {
            num_simulations: 5000,
            random_seed: Some(3),
            ..MonteCarloConfig::default()
        };
        let result = engine
            .monte_carlo(&returns, pv, 95.0, &mc_config)
            .unwrap();
        let details = result.mc_details.unwrap();
        assert!(details.tail_scenarios > 0);
        assert!(details.worst <= details.best);
        assert!(result.cvar.abs() >= result.var.var.abs());
    }

    #[test]
    fn stress_reports_worst_case_and_average() {
        let engine = CVarEngine::new(CVarConfig::default());
        let pv = Decimal::from_i64(1_000_000);
        let mut scenarios = BTreeMap::new();
        scenarios.insert("mild".to_string(), returns_n(400));
        scenarios.insert("severe".to_string(), returns_n(400).into_iter().map(|d| d.mul(Decimal::from_i64(3))).collect());

        let result = engine.stress(&scenarios, pv, 95.0).unwrap();
        assert_eq!(result.scenarios.len(), 2);
        assert!(result.worst_case_cvar.abs() >= result.average_cvar_magnitude);
    }

    #[test]
    fn parametric_cvar_approx_matches_documented_multiplier() {
        let var = Decimal::from_f64(-100.0);
        let approx = CVarEngine::parametric_cvar_approx(var);
        assert!((approx.to_f64() - (-130.0)).abs() < 1e-9);
    }

    #[test]
    fn tail_obs_count_matches_actual_tail_length() {
        let engine = CVarEngine::new(CVarConfig::default());
        let returns = returns_n(500);
        let pv = Decimal::from_i64(1_000_000);
        let result = engine.historical(&returns, pv, 95.0).unwrap();
        assert_eq!(
            result.tail_statistics.tail_obs_count,
            result.tail_analysis.unwrap().tail_returns.len()
        );
    }
}
