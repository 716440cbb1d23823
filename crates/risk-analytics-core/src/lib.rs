pub mod cache;
pub mod config;
pub mod cvar;
pub mod decimal;
pub mod drawdown;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod orchestrator;
pub mod quantile;
#[cfg(test)]
mod scenarios;
pub mod stats;
pub mod var;

pub use cache::{CacheEntry, CacheKey, VarCache};
pub use config::{CVarConfig, DrawdownConfig, MonteCarloConfig, PerformanceThresholds, RiskLimits, VarConfig};
pub use cvar::{CVarEngine, CVarResult, McCVarDetails, StressResult, TailAnalysis, TailStatistics};
pub use decimal::Decimal;
pub use drawdown::{DrawdownAlert, DrawdownMonitor, DrawdownState, DrawdownStatistics};
pub use error::{ErrorCategory, RiskError, RiskErrorCode, RiskResult, Severity};
pub use logging::{log_calculation_complete, log_calculation_start, log_error, LogContext};
pub use monitor::{LatencyReport, PerformanceMonitor, SystemSnapshot};
pub use orchestrator::{
    CalculationContext, CalculationRequest, CalculationStatus, ProductionOrchestrator,
    ProductionResult, StreamingCalculator,
};
pub use quantile::P2Estimator;
pub use var::{
    BacktestResult, ComponentContribution, ComponentVarResult, MonteCarloDetails, Position,
    SortedReturnsPool, Statistics, VarEngine, VarMethod, VarResult,
};
