//! Context-carried event emission.
//!
//! This is not a logging backend — like every other crate in this
//! workspace, `risk-analytics-core` emits through `tracing` and leaves
//! format (JSON vs. text) and sink selection to whichever binary installs a
//! `tracing-subscriber` layer. What this module guarantees is that the
//! field names expected on calculation and error events are always
//! attached.

use std::time::Duration;

use crate::error::RiskError;

const SLA_BUDGET: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub portfolio_id: Option<String>,
}

/// Emits the calculation-start informational event.
pub fn log_calculation_start(ctx: &LogContext, kind: &str, method: &str, data_points: usize) {
    tracing::info!(
        request_id = ctx.request_id.as_deref().unwrap_or(""),
        correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
        portfolio_id = ctx.portfolio_id.as_deref().unwrap_or(""),
        calculation_type = kind,
        method,
        data_points,
        "calculation started"
    );
}

/// Emits the calculation-complete event, tagging SLA compliance.
pub fn log_calculation_complete(
    ctx: &LogContext,
    kind: &str,
    method: &str,
    duration: Duration,
    success: bool,
    result_summary: &str,
) {
    let performance = if duration <= SLA_BUDGET {
        "COMPLIANT"
    } else {
        "SLA_VIOLATION"
    };
    let sla_multiplier = duration.as_nanos() as f64 / SLA_BUDGET.as_nanos() as f64;

    tracing::info!(
        request_id = ctx.request_id.as_deref().unwrap_or(""),
        correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
        portfolio_id = ctx.portfolio_id.as_deref().unwrap_or(""),
        calculation_type = kind,
        method,
        duration_ns = duration.as_nanos() as u64,
        success,
        performance,
        sla_multiplier,
        result_summary,
        "calculation complete"
    );
}

/// Emits an error event, mapping severity to a `tracing` level.
pub fn log_error(ctx: &LogContext, err: &RiskError) {
    let retryable = err.retry_config.is_some();
    match err.severity {
        crate::error::Severity::Critical => {
            tracing::error!(
                request_id = ctx.request_id.as_deref().unwrap_or(""),
                correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
                error_code = ?err.code,
                error_severity = "Critical",
                error_category = ?err.category,
                actual_data = err.details.actual.as_deref().unwrap_or(""),
                expected_data = err.details.expected.as_deref().unwrap_or(""),
                constraints = err.details.constraints.as_deref().unwrap_or(""),
                retryable,
                underlying_cause = err.cause.as_deref().unwrap_or(""),
                "critical error: {}", err.message
            );
        }
        crate::error::Severity::High => {
            tracing::error!(
                request_id = ctx.request_id.as_deref().unwrap_or(""),
                correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
                error_code = ?err.code,
                error_severity = "High",
                error_category = ?err.category,
                actual_data = err.details.actual.as_deref().unwrap_or(""),
                expected_data = err.details.expected.as_deref().unwrap_or(""),
                constraints = err.details.constraints.as_deref().unwrap_or(""),
                retryable,
                underlying_cause = err.cause.as_deref().unwrap_or(""),
                "{}", err.message
            );
        }
        crate::error::Severity::Medium => {
            tracing::warn!(
                request_id = ctx.request_id.as_deref().unwrap_or(""),
                correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
                error_code = ?err.code,
                error_severity = "Medium",
                error_category = ?err.category,
                actual_data = err.details.actual.as_deref().unwrap_or(""),
                expected_data = err.details.expected.as_deref().unwrap_or(""),
                constraints = err.details.constraints.as_deref().unwrap_or(""),
                retryable,
                "{}", err.message
            );
        }
        crate::error::Severity::Low => {
            tracing::info!(
                request_id = ctx.request_id.as_deref().unwrap_or(""),
                correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
                error_code = ?err.code,
                error_severity = "Low",
                error_category = ?err.category,
                retryable,
                "{}", err.message
            );
        }
    }
}
