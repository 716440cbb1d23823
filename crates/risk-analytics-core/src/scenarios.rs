//! Cross-module worked examples and acceptance scenarios, exercised against
//! the public API the way a consumer crate would call it rather than against
//! any single module's internals.

#[cfg(test)]
mod scenarios {
    use std::sync::Arc;

    use crate::config::VarConfig;
    use crate::decimal::Decimal;
    use crate::error::RiskErrorCode;
    use crate::monitor::PerformanceMonitor;
    use crate::orchestrator::{CalculationRequest, ProductionOrchestrator};
    use crate::var::{Position, VarEngine};

    fn s1_returns() -> Vec<Decimal> {
        [-0.10, -0.08, -0.06, -0.05, -0.03, -0.02, 0.01, 0.02, 0.03, 0.04]
            .iter()
            .map(|v| Decimal::from_f64(*v))
            .collect()
    }

    #[test]
    fn s1_ten_point_series_at_95_percent() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = s1_returns();
        let pv = Decimal::from_i64(1_000_000);

        let var = engine.historical(&returns, pv, 95.0).unwrap();
        assert!((var.var.to_f64() - (-100_000.0)).abs() < 1.0);

        let cvar_engine = crate::cvar::CVarEngine::new(crate::config::CVarConfig::default());
        let cvar = cvar_engine.historical(&returns, pv, 95.0).unwrap();
        assert!((cvar.cvar.to_f64() - (-100_000.0)).abs() < 1.0);
        assert_eq!(cvar.tail_statistics.tail_obs_count, 1);
    }

    #[test]
    fn s2_ninety_and_ninety_five_agree_on_same_single_element_tail() {
        let engine = VarEngine::new(VarConfig::default());
        let returns = s1_returns();
        let pv = Decimal::from_i64(1_000_000);

        let var95 = engine.historical(&returns, pv, 95.0).unwrap();
        let var90 = engine.historical(&returns, pv, 90.0).unwrap();
        assert_eq!(var90.var, var95.var);

        let cvar_engine = crate::cvar::CVarEngine::new(crate::config::CVarConfig::default());
        let cvar95 = cvar_engine.historical(&returns, pv, 95.0).unwrap();
        let cvar90 = cvar_engine.historical(&returns, pv, 90.0).unwrap();
        assert_eq!(cvar90.cvar, cvar95.cvar);
    }

    #[test]
    fn s3_insufficient_data_reports_min_and_provided() {
        let mut config = VarConfig::default();
        config.min_obs = 100;
        let engine = VarEngine::new(config);
        let returns: Vec<Decimal> = (0..50).map(|i| Decimal::from_f64(i as f64 * 0.001)).collect();

        let err = engine
            .historical(&returns, Decimal::from_i64(1_000_000), 95.0)
            .unwrap_err();
        assert_eq!(err.code, RiskErrorCode::InsufficientData);
        assert_eq!(err.details.expected.unwrap(), "min_observations=100");
        assert_eq!(err.details.actual.unwrap(), "provided_observations=50");
    }

    #[test]
    fn s4_invalid_confidence_rejected() {
        let engine = VarEngine::new(VarConfig::default());
        let returns: Vec<Decimal> = (0..300).map(|i| Decimal::from_f64((i as f64 * 0.37) % 1.0 - 0.5)).collect();
        let err = engine
            .historical(&returns, Decimal::from_i64(1_000_000), 105.0)
            .unwrap_err();
        assert_eq!(err.code, RiskErrorCode::InvalidConfidence);
        assert_eq!(err.details.constraints.unwrap(), "0 < confidence < 100");
    }

    #[tokio::test]
    async fn s5_warm_cache_rescales_exactly_on_second_portfolio_value() {
        let engine = VarEngine::new(VarConfig::default());
        let orchestrator = ProductionOrchestrator::new(
            engine,
            VarConfig::default(),
            crate::config::RiskLimits::default(),
            Arc::new(PerformanceMonitor::new()),
        );

        let returns: Vec<Decimal> = (0..1000)
            .map(|i| {
                let x = ((i as f64) * 0.6180339887) % 1.0;
                Decimal::from_f64((x - 0.5) * 0.2)
            })
            .collect();

        let first = orchestrator
            .calculate(CalculationRequest {
                returns: returns.clone(),
                portfolio_value: Decimal::from_i64(1_000_000),
                confidence: 95.0,
                request_id: None,
                correlation_id: None,
            })
            .await
            .unwrap();
        assert!(!first.cache_hit);

        let second = orchestrator
            .calculate(CalculationRequest {
                returns,
                portfolio_value: Decimal::from_i64(2_000_000),
                confidence: 95.0,
                request_id: None,
                correlation_id: None,
            })
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.output.var, first.output.var.mul(Decimal::from_i64(2)));
    }

    #[test]
    fn s6_streaming_p99_latency_is_within_one_millisecond_warm() {
        let engine = VarEngine::new(VarConfig::default());
        let returns: Vec<Decimal> = (0..100_000)
            .map(|i| {
                let x = ((i as f64) * 0.0001).sin();
                Decimal::from_f64(x * 0.05)
            })
            .collect();
        let pv = Decimal::from_i64(1_000_000);

        // warm up
        for _ in 0..10 {
            engine.streaming(&returns, pv, 99.0).unwrap();
        }

        let mut samples = Vec::with_capacity(1000);
        for _ in 0..1000 {
            let start = std::time::Instant::now();
            engine.streaming(&returns, pv, 99.0).unwrap();
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p99 = samples[(0.99 * (samples.len() as f64 - 1.0)).round() as usize];
        assert!(p99 <= 1.0, "p99 streaming latency {p99}ms exceeded 1ms budget");
    }

    #[test]
    fn component_var_reflects_positive_and_negative_weighted_positions() {
        let engine = VarEngine::new(VarConfig::default());
        let positions = vec![
            Position {
                symbol: "LONG".into(),
                returns: (0..300).map(|i| Decimal::from_f64((i as f64 * 0.31) % 1.0 - 0.5)).collect(),
                weight: 0.7,
            },
            Position {
                symbol: "SHORT".into(),
                returns: (0..300).map(|i| Decimal::from_f64((i as f64 * 0.53) % 1.0 - 0.5)).collect(),
                weight: 0.3,
            },
        ];
        let result = engine
            .component_var(&positions, Decimal::from_i64(1_000_000), 95.0)
            .unwrap();
        assert_eq!(result.components.len(), 2);
        assert!(!result.diversified);
        let weight_sum: f64 = result.components.iter().map(|c| c.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }
}
