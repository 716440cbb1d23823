//! Configuration structs for the VaR/CVaR/drawdown engines and the
//! production orchestrator.
//!
//! Follows `risk_manager::models::RiskParameters`'s convention: a plain
//! struct with an `impl Default` carrying the documented defaults. This
//! crate does not load config from env/files — that's a caller concern.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    pub p99_ms: f64,
    pub p95_ms: f64,
    pub min_qps: f64,
    pub max_mem_mb: f64,
    pub max_cpu_percent: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        PerformanceThresholds {
            p99_ms: 1.0,
            p95_ms: 0.5,
            min_qps: 100.0,
            max_mem_mb: 512.0,
            max_cpu_percent: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    pub default_method: String,
    pub default_confidence: f64,
    pub min_obs: usize,
    /// Minimum observations for the streaming/optimized variants, which
    /// need less history than the sort-based baseline (`spec.md` §4.6).
    pub streaming_min_obs: usize,
    pub max_obs: usize,
    pub supported_methods: Vec<String>,
    pub enable_backtesting: bool,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub enable_caching: bool,
    pub cache_ttl: Duration,
    pub validation_enabled: bool,
    pub performance_thresholds: PerformanceThresholds,
}

impl Default for VarConfig {
    fn default() -> Self {
        VarConfig {
            default_method: "historical".to_string(),
            default_confidence: 95.0,
            min_obs: crate::var::HISTORICAL_MIN_OBS,
            streaming_min_obs: crate::var::STREAMING_MIN_OBS,
            max_obs: 100_000,
            supported_methods: vec![
                "historical".to_string(),
                "parametric".to_string(),
                "monte_carlo".to_string(),
                "streaming".to_string(),
                "optimized".to_string(),
            ],
            enable_backtesting: true,
            max_concurrent: 100,
            timeout: Duration::from_secs(5),
            enable_caching: true,
            cache_ttl: Duration::from_secs(300),
            validation_enabled: true,
            performance_thresholds: PerformanceThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_portfolio_value: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub max_tail_risk_pct: f64,
    pub alert_multiplier: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_portfolio_value: 1.0e12,
            min_confidence: 1.0,
            max_confidence: 99.99,
            max_tail_risk_pct: 50.0,
            alert_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVarConfig {
    pub var: VarConfig,
    pub enable_tail_analysis: bool,
    pub tail_thresholds: Vec<f64>,
    pub risk_limits: RiskLimits,
}

impl Default for CVarConfig {
    fn default() -> Self {
        CVarConfig {
            var: VarConfig {
                timeout: Duration::from_secs(10),
                ..VarConfig::default()
            },
            enable_tail_analysis: true,
            tail_thresholds: vec![90.0, 95.0, 99.0],
            risk_limits: RiskLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub num_simulations: u32,
    pub time_horizon_days: u32,
    pub random_seed: Option<u64>,
    pub use_antithetic: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            num_simulations: 10_000,
            time_horizon_days: 1,
            random_seed: None,
            use_antithetic: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownConfig {
    pub enable_real_time_alerts: bool,
    pub alert_thresholds: Vec<f64>,
    pub max_acceptable_drawdown: f64,
    pub history_retention_days: u32,
}

impl Default for DrawdownConfig {
    fn default() -> Self {
        DrawdownConfig {
            enable_real_time_alerts: true,
            alert_thresholds: vec![5.0, 10.0, 20.0],
            max_acceptable_drawdown: 25.0,
            history_retention_days: 365,
        }
    }
}
