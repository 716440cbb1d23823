//! Categorised, severity-tagged, retry-aware error values.
//!
//! Follows the shape of `analysis_core::AnalysisError` / `ml_client::MLError`
//! (a `thiserror`-derived code enum plus a `Result` alias), but the
//! enrichment fields needed here (`details`, `context`, `retry_config`)
//! don't fit a tuple-variant enum, so `RiskError` itself is a hand-built
//! struct carrying one of these codes plus a fluent builder.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum RiskErrorCode {
    // Validation
    #[error("insufficient data")]
    InsufficientData,
    #[error("invalid confidence level")]
    InvalidConfidence,
    #[error("invalid portfolio value")]
    InvalidPortfolio,
    #[error("missing required field")]
    MissingRequiredField,

    // Calculation
    #[error("calculation failed")]
    CalculationFailed,
    #[error("division by zero")]
    DivisionByZero,
    #[error("model validation failed")]
    ModelValidationFailed,

    // Configuration
    #[error("invalid configuration")]
    InvalidConfiguration,

    // System
    #[error("operation timed out")]
    Timeout,
    #[error("system overload")]
    SystemOverload,
    #[error("resource limited")]
    ResourceLimited,
    #[error("concurrency limit reached")]
    ConcurrencyLimit,
    #[error("data corrupted")]
    CorruptedData,

    // Dependency
    #[error("database connection failure")]
    DatabaseConnection,
    #[error("network failure")]
    NetworkFailure,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("cache unavailable")]
    CacheUnavailable,

    // Business
    #[error("risk limit exceeded")]
    RiskLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Validation,
    Calculation,
    Configuration,
    System,
    Dependency,
    Business,
}

impl RiskErrorCode {
    pub fn category(self) -> ErrorCategory {
        use RiskErrorCode::*;
        match self {
            InsufficientData | InvalidConfidence | InvalidPortfolio | MissingRequiredField => {
                ErrorCategory::Validation
            }
            CalculationFailed | DivisionByZero | ModelValidationFailed => {
                ErrorCategory::Calculation
            }
            InvalidConfiguration => ErrorCategory::Configuration,
            Timeout | SystemOverload | ResourceLimited | ConcurrencyLimit | CorruptedData => {
                ErrorCategory::System
            }
            DatabaseConnection | NetworkFailure | ServiceUnavailable | CacheUnavailable => {
                ErrorCategory::Dependency
            }
            RiskLimitExceeded => ErrorCategory::Business,
        }
    }

    pub fn severity(self) -> Severity {
        use RiskErrorCode::*;
        match self {
            CorruptedData | SystemOverload | ConcurrencyLimit => Severity::Critical,
            Timeout | CalculationFailed | RiskLimitExceeded | ModelValidationFailed => {
                Severity::High
            }
            InsufficientData | InvalidConfidence | InvalidPortfolio | MissingRequiredField
            | ResourceLimited | DatabaseConnection | NetworkFailure | ServiceUnavailable
            | CacheUnavailable | InvalidConfiguration | DivisionByZero => Severity::Medium,
        }
    }

    pub fn retry_config(self) -> Option<RetryConfig> {
        use RiskErrorCode::*;
        match self {
            Timeout | SystemOverload | ResourceLimited => Some(RetryConfig {
                base_delay_ms: 100,
                max_attempts: 3,
                exp_base: 2.0,
            }),
            DatabaseConnection | NetworkFailure => Some(RetryConfig {
                base_delay_ms: 250,
                max_attempts: 5,
                exp_base: 1.5,
            }),
            ServiceUnavailable | CacheUnavailable => Some(RetryConfig {
                base_delay_ms: 500,
                max_attempts: 2,
                exp_base: 1.5,
            }),
            _ => None,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.retry_config().is_some()
    }

    pub fn is_critical(self) -> bool {
        matches!(
            self,
            RiskErrorCode::CorruptedData
                | RiskErrorCode::SystemOverload
                | RiskErrorCode::ConcurrencyLimit
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
    pub exp_base: f64,
}

const MAX_BACKOFF_MS: u64 = 30_000;

impl RetryConfig {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// `min(base * exp_base^attempt, max_backoff)`, with up to +25% jitter.
    pub fn retry_delay_ms(&self, attempt: u32, jitter: f64) -> u64 {
        let jitter = jitter.clamp(0.0, 1.0);
        let raw = self.base_delay_ms as f64 * self.exp_base.powi(attempt as i32);
        let capped = raw.min(MAX_BACKOFF_MS as f64);
        (capped * (1.0 + 0.25 * jitter)) as u64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub operation: Option<String>,
    pub input: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub constraints: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub portfolio_id: Option<String>,
    pub component: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskError {
    pub code: RiskErrorCode,
    pub message: String,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub details: ErrorDetails,
    pub context: ErrorContext,
    pub timestamp_unix_ms: u64,
    pub retry_config: Option<RetryConfig>,
    pub cause: Option<String>,
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RiskError {
    pub fn new(code: RiskErrorCode) -> Self {
        RiskError {
            message: code.to_string(),
            severity: code.severity(),
            category: code.category(),
            details: ErrorDetails::default(),
            context: ErrorContext::default(),
            timestamp_unix_ms: now_unix_ms(),
            retry_config: code.retry_config(),
            cause: None,
            code,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_details(
        mut self,
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.details.operation = Some(operation.into());
        self.details.expected = Some(expected.into());
        self.details.actual = Some(actual.into());
        self
    }

    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.details.constraints = Some(constraints.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.details.input = Some(input.into());
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn insufficient_data(min_observations: usize, provided_observations: usize) -> Self {
        Self::new(RiskErrorCode::InsufficientData)
            .with_message(format!(
                "insufficient data: need at least {min_observations} observations, got {provided_observations}"
            ))
            .with_details(
                "validate_observations",
                format!("min_observations={min_observations}"),
                format!("provided_observations={provided_observations}"),
            )
    }

    pub fn invalid_confidence(confidence: f64) -> Self {
        Self::new(RiskErrorCode::InvalidConfidence)
            .with_message(format!("invalid confidence level: {confidence}"))
            .with_details("validate_confidence", "0 < confidence < 100", confidence.to_string())
            .with_constraints("0 < confidence < 100")
    }

    pub fn invalid_portfolio(portfolio_value: f64) -> Self {
        Self::new(RiskErrorCode::InvalidPortfolio)
            .with_message(format!("invalid portfolio value: {portfolio_value}"))
            .with_details("validate_portfolio", "portfolio_value > 0", portfolio_value.to_string())
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.retry_config
            .as_ref()
            .is_some_and(|rc| rc.should_retry(attempt))
    }

    pub fn retry_delay_ms(&self, attempt: u32, jitter: f64) -> Option<u64> {
        self.retry_config
            .as_ref()
            .map(|rc| rc.retry_delay_ms(attempt, jitter))
    }
}

impl std::fmt::Display for RiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.category, self.severity, self.message)
    }
}

impl std::error::Error for RiskError {}

pub type RiskResult<T> = Result<T, RiskError>;
