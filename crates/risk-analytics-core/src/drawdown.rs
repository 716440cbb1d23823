//! Drawdown monitor: peak/trough tracking with regenerated threshold alerts.
//!
//! The peak-tracking loop shape follows
//! `quant_analysis::QuantAnalysisEngine::calculate_max_drawdown`; alert
//! modeling follows `risk_manager::manager::check_circuit_breakers`, which
//! rebuilds `breakers_triggered` from scratch on every check rather than
//! accumulating it — the same "regenerate, don't accumulate" rule applies
//! here to `active_alerts`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DrawdownConfig;
use crate::decimal::Decimal;
use crate::error::{RiskError, RiskResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownEntry {
    pub value: Decimal,
    pub peak: Decimal,
    pub drawdown: Decimal,
    pub drawdown_pct: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownAlert {
    pub threshold_pct: f64,
    pub current_pct: f64,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownState {
    pub current_peak: Decimal,
    pub current_value: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub history: Vec<DrawdownEntry>,
    pub active_alerts: Vec<DrawdownAlert>,
}

impl DrawdownState {
    fn new() -> Self {
        DrawdownState {
            current_peak: Decimal::ZERO,
            current_value: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            history: Vec::new(),
            active_alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownStatistics {
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub avg_drawdown_pct: f64,
    pub max_drawdown_duration: usize,
    pub current_drawdown_duration: usize,
    pub num_updates: usize,
}

struct DurationReport {
    max_drawdown_duration: usize,
    current_drawdown_duration: usize,
}

pub struct DrawdownMonitor {
    pub state: DrawdownState,
    config: DrawdownConfig,
}

impl DrawdownMonitor {
    pub fn new(config: DrawdownConfig) -> Self {
        DrawdownMonitor {
            state: DrawdownState::new(),
            config,
        }
    }

    /// Appends to history; `peak := max(peak, value)`,
    /// `current_drawdown := max(0, peak - value)`,
    /// `max_drawdown := max(max_drawdown, current_drawdown)`; re-evaluates
    /// alert thresholds from scratch.
    pub fn update(&mut self, value: Decimal) -> RiskResult<()> {
        if value.is_negative() {
            return Err(RiskError::invalid_portfolio(value.to_f64()));
        }

        if self.state.history.is_empty() {
            self.state.current_peak = value;
        }
        self.state.current_value = value;
        if value > self.state.current_peak {
            self.state.current_peak = value;
        }

        let drawdown = if self.state.current_peak > value {
            self.state.current_peak.sub(value)
        } else {
            Decimal::ZERO
        };
        if drawdown.abs() > self.state.max_drawdown.abs() {
            self.state.max_drawdown = drawdown;
        }

        let drawdown_pct = Self::pct_of(drawdown, self.state.current_peak);
        if drawdown_pct > self.state.max_drawdown_pct {
            self.state.max_drawdown_pct = drawdown_pct;
        }

        self.state.history.push(DrawdownEntry {
            value,
            peak: self.state.current_peak,
            drawdown,
            drawdown_pct,
            timestamp: Utc::now(),
        });

        self.evaluate_alerts(drawdown_pct);
        Ok(())
    }

    fn pct_of(drawdown: Decimal, peak: Decimal) -> f64 {
        if peak.is_positive() {
            drawdown.to_f64() / peak.to_f64() * 100.0
        } else {
            0.0
        }
    }

    pub fn current_drawdown_pct(&self) -> f64 {
        Self::pct_of(
            self.state.current_peak.sub(self.state.current_value).max(Decimal::ZERO),
            self.state.current_peak,
        )
    }

    fn evaluate_alerts(&mut self, drawdown_pct: f64) {
        self.state.active_alerts = self
            .config
            .alert_thresholds
            .iter()
            .filter(|&&t| drawdown_pct >= t)
            .map(|&t| DrawdownAlert {
                threshold_pct: t,
                current_pct: drawdown_pct,
                triggered_at: Utc::now(),
            })
            .collect();
    }

    pub fn alerts(&self) -> &[DrawdownAlert] {
        &self.state.active_alerts
    }

    pub fn is_max_breached(&self) -> bool {
        self.current_drawdown_pct() > self.config.max_acceptable_drawdown
    }

    /// Groups history into maximal runs sharing the same peak. A peak
    /// change marks the start of the next run, so every run but the last
    /// is a closed peak→recovery span; the last run is the currently open
    /// drawdown.
    fn segments(&self) -> Vec<(usize, usize)> {
        let history = &self.state.history;
        if history.is_empty() {
            return Vec::new();
        }
        let mut segs = Vec::new();
        let mut start = 0;
        let mut current_peak = history[0].peak;
        for i in 1..history.len() {
            if history[i].peak != current_peak {
                segs.push((start, i - 1));
                start = i;
                current_peak = history[i].peak;
            }
        }
        segs.push((start, history.len() - 1));
        segs
    }

    fn duration_report(&self) -> DurationReport {
        let segs = self.segments();
        if segs.is_empty() {
            return DurationReport {
                max_drawdown_duration: 0,
                current_drawdown_duration: 0,
            };
        }
        let max_drawdown_duration = segs[..segs.len() - 1]
            .iter()
            .map(|(start, end)| end - start)
            .max()
            .unwrap_or(0);
        let (start, end) = segs[segs.len() - 1];
        DurationReport {
            max_drawdown_duration,
            current_drawdown_duration: end - start,
        }
    }

    /// Max drawdown (absolute and pct), average over entries where
    /// `drawdown > 0`, and max/current drawdown duration.
    pub fn statistics(&self) -> DrawdownStatistics {
        let underwater: Vec<f64> = self
            .state
            .history
            .iter()
            .filter(|e| e.drawdown.is_positive())
            .map(|e| e.drawdown_pct)
            .collect();
        let avg_drawdown_pct = if underwater.is_empty() {
            0.0
        } else {
            underwater.iter().sum::<f64>() / underwater.len() as f64
        };
        let duration = self.duration_report();

        DrawdownStatistics {
            max_drawdown: self.state.max_drawdown,
            max_drawdown_pct: self.state.max_drawdown_pct,
            avg_drawdown_pct,
            max_drawdown_duration: duration.max_drawdown_duration,
            current_drawdown_duration: duration.current_drawdown_duration,
            num_updates: self.state.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> DrawdownMonitor {
        DrawdownMonitor::new(DrawdownConfig::default())
    }

    #[test]
    fn max_drawdown_is_non_decreasing() {
        let mut m = monitor();
        let values = [100.0, 95.0, 90.0, 98.0, 85.0, 92.0, 80.0];
        let mut prev = Decimal::ZERO;
        for (i, v) in values.iter().enumerate() {
            m.update(Decimal::from_f64(*v)).unwrap();
            if i > 0 {
                assert!(m.state.max_drawdown.abs() >= prev.abs());
            }
            prev = m.state.max_drawdown;
        }
    }

    #[test]
    fn current_drawdown_pct_tracks_peak() {
        let mut m = monitor();
        m.update(Decimal::from_f64(100.0)).unwrap();
        assert_eq!(m.current_drawdown_pct(), 0.0);
        m.update(Decimal::from_f64(90.0)).unwrap();
        assert!((m.current_drawdown_pct() - 10.0).abs() < 1e-9);
        m.update(Decimal::from_f64(100.0)).unwrap();
        assert_eq!(m.current_drawdown_pct(), 0.0);
    }

    #[test]
    fn alerts_regenerate_and_drop_inactive_thresholds() {
        let mut m = monitor();
        m.update(Decimal::from_f64(100.0)).unwrap();
        m.update(Decimal::from_f64(78.0)).unwrap();
        assert!(m.alerts().iter().any(|a| a.threshold_pct == 5.0));
        assert!(m.alerts().iter().any(|a| a.threshold_pct == 10.0));
        assert!(m.alerts().iter().any(|a| a.threshold_pct == 20.0));

        m.update(Decimal::from_f64(93.0)).unwrap();
        assert_eq!(m.alerts().len(), 1);
        assert_eq!(m.alerts()[0].threshold_pct, 5.0);
    }

    #[test]
    fn is_max_breached_flags_past_configured_ceiling() {
        let mut m = monitor();
        m.update(Decimal::from_f64(100.0)).unwrap();
        assert!(!m.is_max_breached());
        m.update(Decimal::from_f64(70.0)).unwrap();
        assert!(m.is_max_breached());
    }

    #[test]
    fn duration_report_finds_longest_closed_run_and_open_run() {
        let mut m = monitor();
        // Peak 100 holds through idx0-3 (closed run of length 3), a new
        // peak of 101 is set at idx4, then the remaining five updates stay
        // underwater relative to that peak (open run of length 5).
        for v in [100.0, 90.0, 92.0, 95.0, 101.0, 80.0, 85.0, 90.0, 95.0, 99.0] {
            m.update(Decimal::from_f64(v)).unwrap();
        }
        let stats = m.statistics();
        assert_eq!(stats.max_drawdown_duration, 3);
        assert_eq!(stats.current_drawdown_duration, 5);
    }

    #[test]
    fn negative_value_is_rejected() {
        let mut m = monitor();
        assert!(m.update(Decimal::from_f64(-1.0)).is_err());
    }

    #[test]
    fn avg_drawdown_pct_only_counts_underwater_entries() {
        let mut m = monitor();
        for v in [100.0, 100.0, 100.0, 90.0] {
            m.update(Decimal::from_f64(v)).unwrap();
        }
        let stats = m.statistics();
        assert!((stats.avg_drawdown_pct - 10.0).abs() < 1e-9);
    }
}
