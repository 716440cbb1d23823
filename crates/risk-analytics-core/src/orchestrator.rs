//! Production orchestrator: request lifecycle, validation, cache-then-compute,
//! timeout, metrics, health — generic over the wrapped VaR/CVaR engine.
//!
//! The compute-vs-timeout race is grounded on `ml_client::signal_models`'s
//! check-cache-then-do-the-expensive-thing shape, with the network call
//! replaced by a `spawn_blocking`'d engine call raced against
//! `tokio::time::sleep` via two one-shot hand-off channels, giving the
//! compute path a hard deadline without the blocking call being able to
//! poll for cancellation itself. Request/correlation id handling follows
//! `api_server::request_id`; the
//! concurrently-touched active-calculation map follows the `DashMap` usage
//! in `ml_client`/`analysis_orchestrator`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cache::{CacheKey, VarCache};
use crate::config::{RiskLimits, VarConfig};
use crate::cvar::{CVarEngine, CVarResult};
use crate::decimal::Decimal;
use crate::error::{RiskError, RiskErrorCode, RiskResult};
use crate::logging::{log_calculation_complete, log_calculation_start, log_error, LogContext};
use crate::monitor::PerformanceMonitor;
use crate::var::{VarEngine, VarResult};

const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

pub struct CalculationContext {
    pub id: Uuid,
    pub request_id: String,
    pub correlation_id: String,
    pub start_time: Instant,
    pub method: &'static str,
    pub data_size: usize,
    pub status: CalculationStatus,
    pub cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct CalculationRequest {
    pub returns: Vec<Decimal>,
    pub portfolio_value: Decimal,
    pub confidence: f64,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionResult<T> {
    pub output: T,
    pub request_id: String,
    pub correlation_id: String,
    pub computation_time: Duration,
    pub cache_hit: bool,
    pub calculator_version: &'static str,
    pub validation_summary: String,
}

/// Implemented once per wrapped engine (`VarEngine`, `CVarEngine`). `rescale`
/// exists because the cache stores a per-unit-portfolio-value result
/// (computed with `portfolio_value = Decimal::ONE`) and every request
/// rescales it to its own portfolio value on both hit and miss — this keeps
/// cache semantics identical regardless of hit/miss, per `cache.rs`'s
/// documented "portfolio-independent, caller rescales" contract.
pub trait StreamingCalculator: Send + Sync {
    type Output: Clone + Send + Sync + 'static;
    const METHOD: &'static str;

    fn compute(&self, returns: &[Decimal], portfolio_value: Decimal, confidence: f64) -> RiskResult<Self::Output>;
    fn magnitude(output: &Self::Output) -> Decimal;
    fn rescale(output: &Self::Output, target_portfolio_value: Decimal) -> Self::Output;

    /// Output validation. Historical/Monte Carlo CVaR already clamp `cvar`
    /// to `var`'s magnitude internally, so this is a defensive re-check,
    /// not the primary enforcement point.
    fn validate_output(&self, _output: &Self::Output) -> RiskResult<()> {
        Ok(())
    }
}

impl StreamingCalculator for VarEngine {
    type Output = VarResult;
    const METHOD: &'static str = "var";

    fn compute(&self, returns: &[Decimal], portfolio_value: Decimal, confidence: f64) -> RiskResult<VarResult> {
        self.streaming(returns, portfolio_value, confidence)
    }

    fn magnitude(output: &VarResult) -> Decimal {
        output.magnitude()
    }

    fn rescale(output: &VarResult, target_portfolio_value: Decimal) -> VarResult {
        let mut rescaled = output.clone();
        rescaled.var = output.var.mul(target_portfolio_value);
        rescaled.statistics.mean = output.statistics.mean.mul(target_portfolio_value);
        rescaled.statistics.std_dev = output.statistics.std_dev.mul(target_portfolio_value);
        rescaled.portfolio_value = target_portfolio_value;
        rescaled
    }
}

impl StreamingCalculator for CVarEngine {
    type Output = CVarResult;
    const METHOD: &'static str = "cvar";

    fn compute(&self, returns: &[Decimal], portfolio_value: Decimal, confidence: f64) -> RiskResult<CVarResult> {
        self.streaming(returns, portfolio_value, confidence)
    }

    fn magnitude(output: &CVarResult) -> Decimal {
        output.magnitude()
    }

    fn rescale(output: &CVarResult, target_portfolio_value: Decimal) -> CVarResult {
        let mut rescaled = output.clone();
        rescaled.var = VarEngine::rescale(&output.var, target_portfolio_value);
        rescaled.cvar = output.cvar.mul(target_portfolio_value);
        rescaled.tail_statistics.avg_tail_loss = output.tail_statistics.avg_tail_loss.mul(target_portfolio_value);
        rescaled.tail_statistics.worst_tail_loss = output.tail_statistics.worst_tail_loss.mul(target_portfolio_value);
        rescaled.tail_statistics.tail_volatility = output.tail_statistics.tail_volatility.mul(target_portfolio_value);
        rescaled
    }

    fn validate_output(&self, output: &CVarResult) -> RiskResult<()> {
        if output.cvar.abs() < output.var.var.abs() {
            return Err(RiskError::new(RiskErrorCode::ModelValidationFailed)
                .with_message("cvar magnitude fell below var magnitude after rescale"));
        }
        Ok(())
    }
}

pub struct ProductionOrchestrator<E: StreamingCalculator> {
    engine: Arc<E>,
    cache: Option<VarCache<E::Output>>,
    monitor: Arc<PerformanceMonitor>,
    active: Arc<DashMap<Uuid, CalculationContext>>,
    limits: RiskLimits,
    var_config: VarConfig,
    healthy: Arc<AtomicBool>,
}

impl<E: StreamingCalculator + 'static> ProductionOrchestrator<E> {
    pub fn new(engine: E, var_config: VarConfig, limits: RiskLimits, monitor: Arc<PerformanceMonitor>) -> Self {
        let cache = var_config
            .enable_caching
            .then(|| VarCache::new(DEFAULT_CACHE_CAPACITY, var_config.cache_ttl));

        ProductionOrchestrator {
            engine: Arc::new(engine),
            cache,
            monitor,
            active: Arc::new(DashMap::new()),
            limits,
            var_config,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Spawns the 30s health-monitor tick; owned per orchestrator instance,
    /// no global state.
    pub fn spawn_health_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let active = Arc::clone(&self.active);
        let healthy = Arc::clone(&self.healthy);
        let max_concurrent = self.var_config.max_concurrent;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                healthy.store(active.len() <= max_concurrent, Ordering::Relaxed);
            }
        })
    }

    /// Best-effort: flags the context `Canceled`. Since the compute itself
    /// never polls for cancellation, an already-dispatched calculation runs
    /// to completion regardless; only its result delivery is affected by
    /// this flag at the orchestrator's discretion.
    pub fn cancel(&self, id: Uuid) {
        if let Some(mut ctx) = self.active.get_mut(&id) {
            ctx.cancel.store(true, Ordering::Relaxed);
            ctx.status = CalculationStatus::Canceled;
        }
    }

    fn validate_request(&self, request: &CalculationRequest) -> RiskResult<()> {
        if !self.var_config.validation_enabled {
            return Ok(());
        }
        if request.returns.len() < self.var_config.min_obs || request.returns.len() > self.var_config.max_obs {
            return Err(RiskError::insufficient_data(self.var_config.min_obs, request.returns.len()));
        }
        if request.confidence < self.limits.min_confidence || request.confidence > self.limits.max_confidence {
            return Err(RiskError::invalid_confidence(request.confidence));
        }
        if !request.portfolio_value.is_positive()
            || request.portfolio_value.to_f64() > self.limits.max_portfolio_value
        {
            return Err(RiskError::invalid_portfolio(request.portfolio_value.to_f64()));
        }
        Ok(())
    }

    fn finish(&self, id: Uuid, status: CalculationStatus) {
        if let Some(mut ctx) = self.active.get_mut(&id) {
            ctx.status = status;
        }
        self.active.remove(&id);
    }

    pub async fn calculate(&self, request: CalculationRequest) -> RiskResult<ProductionResult<E::Output>> {
        let start = Instant::now();
        let request_id = request.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let correlation_id = request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let calc_id = Uuid::new_v4();

        let log_ctx = LogContext {
            request_id: Some(request_id.clone()),
            correlation_id: Some(correlation_id.clone()),
            ..LogContext::default()
        };

        if self.active.len() >= self.var_config.max_concurrent {
            let err = RiskError::new(RiskErrorCode::SystemOverload)
                .with_message("orchestrator at max_concurrent_calculations");
            log_error(&log_ctx, &err);
            return Err(err);
        }

        if let Err(err) = self.validate_request(&request) {
            log_error(&log_ctx, &err);
            return Err(err);
        }

        self.active.insert(
            calc_id,
            CalculationContext {
                id: calc_id,
                request_id: request_id.clone(),
                correlation_id: correlation_id.clone(),
                start_time: start,
                method: E::METHOD,
                data_size: request.returns.len(),
                status: CalculationStatus::Running,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );

        log_calculation_start(&log_ctx, E::METHOD, "streaming", request.returns.len());

        let key = CacheKey::new(&request.returns, request.confidence);
        let outcome = self.dispatch_or_fetch(&key, &request).await;

        let (output, cache_hit) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                self.monitor.record_calculation(start.elapsed(), false);
                log_error(&log_ctx, &err);
                let status = if err.code == RiskErrorCode::Timeout {
                    CalculationStatus::TimedOut
                } else {
                    CalculationStatus::Failed
                };
                self.finish(calc_id, status);
                return Err(err);
            }
        };

        if let Err(err) = self.engine.validate_output(&output) {
            self.monitor.record_calculation(start.elapsed(), false);
            log_error(&log_ctx, &err);
            self.finish(calc_id, CalculationStatus::Failed);
            return Err(err);
        }

        if cache_hit {
            self.monitor.record_cache_hit();
        } else {
            self.monitor.record_cache_miss();
        }

        let computation_time = start.elapsed();
        self.monitor.record_calculation(computation_time, true);
        log_calculation_complete(
            &log_ctx,
            E::METHOD,
            "streaming",
            computation_time,
            true,
            &format!("magnitude={}", E::magnitude(&output)),
        );
        self.finish(calc_id, CalculationStatus::Completed);

        Ok(ProductionResult {
            output,
            request_id,
            correlation_id,
            computation_time,
            cache_hit,
            calculator_version: env!("CARGO_PKG_VERSION"),
            validation_summary: "ok".to_string(),
        })
    }

    async fn dispatch_or_fetch(
        &self,
        key: &CacheKey,
        request: &CalculationRequest,
    ) -> RiskResult<(E::Output, bool)> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(key) {
                return Ok((E::rescale(&cached, request.portfolio_value), true));
            }
        }

        let unit = self.run_with_timeout(request).await?;
        if let Some(cache) = &self.cache {
            cache.set(*key, unit.clone());
        }
        Ok((E::rescale(&unit, request.portfolio_value), false))
    }

    /// Races the compute worker against `var_config.timeout` using two
    /// one-shot hand-off channels.
    async fn run_with_timeout(&self, request: &CalculationRequest) -> RiskResult<E::Output> {
        let (result_tx, result_rx) = oneshot::channel::<E::Output>();
        let (error_tx, error_rx) = oneshot::channel::<RiskError>();

        let engine = Arc::clone(&self.engine);
        let returns = request.returns.clone();
        let confidence = request.confidence;

        tokio::task::spawn_blocking(move || match engine.compute(&returns, Decimal::ONE, confidence) {
            Ok(output) => {
                let _ = result_tx.send(output);
            }
            Err(err) => {
                let _ = error_tx.send(err);
            }
        });

        tokio::select! {
            Ok(output) = result_rx => Ok(output),
            Ok(err) = error_rx => Err(err),
            _ = tokio::time::sleep(self.var_config.timeout) => {
                Err(RiskError::new(RiskErrorCode::Timeout)
                    .with_message(format!("{} calculation exceeded {:?}", E::METHOD, self.var_config.timeout)))
            }
        }
    }
}
