//! Risk limits and soft alert thresholds.

use super::RiskMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitKind {
    PortfolioVar,
    Leverage,
    Concentration,
    Custom(String),
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::PortfolioVar => write!(f, "PORTFOLIO_VAR"),
            LimitKind::Leverage => write!(f, "LEVERAGE"),
            LimitKind::Concentration => write!(f, "CONCENTRATION"),
            LimitKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A hard risk limit. `current_value`, `utilization_pct`, and `is_breached`
/// are refreshed on every risk sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    pub kind: LimitKind,
    /// None for portfolio-wide limits.
    pub symbol: Option<String>,
    pub limit_value: f64,
    pub current_value: f64,
    pub utilization_pct: f64,
    pub is_breached: bool,
    pub description: String,
}

impl RiskLimit {
    pub fn new(kind: LimitKind, limit_value: f64, description: &str) -> Self {
        Self {
            kind,
            symbol: None,
            limit_value,
            current_value: 0.0,
            utilization_pct: 0.0,
            is_breached: false,
            description: description.to_string(),
        }
    }

    /// Refresh the limit against an observed value.
    pub fn observe(&mut self, current: f64) {
        self.current_value = current;
        self.utilization_pct = if self.limit_value != 0.0 {
            current / self.limit_value * 100.0
        } else {
            0.0
        };
        self.is_breached = current > self.limit_value;
    }
}

/// The built-in limit set: 1-day 95% VaR, gross leverage, and single-name
/// concentration.
pub fn default_limits() -> Vec<RiskLimit> {
    vec![
        RiskLimit::new(
            LimitKind::PortfolioVar,
            0.02,
            "Daily portfolio VaR, 95% confidence",
        ),
        RiskLimit::new(LimitKind::Leverage, 3.0, "Maximum portfolio leverage"),
        RiskLimit::new(
            LimitKind::Concentration,
            0.10,
            "Maximum single position concentration",
        ),
    ]
}

/// Informational alert thresholds, softer than the hard limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub var_breach: f64,
    pub drawdown: f64,
    pub leverage: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            var_breach: 0.015,
            drawdown: 0.05,
            leverage: 2.5,
        }
    }
}

impl AlertThresholds {
    /// Human-readable alerts for any threshold the metrics exceed.
    pub fn check(&self, metrics: &RiskMetrics) -> Vec<String> {
        let mut alerts = Vec::new();
        if metrics.var_1day_95 > self.var_breach {
            alerts.push(format!(
                "VaR breach: {:.2}% exceeds alert threshold {:.2}%",
                metrics.var_1day_95 * 100.0,
                self.var_breach * 100.0
            ));
        }
        if metrics.leverage > self.leverage {
            alerts.push(format!(
                "High leverage: {:.2}x exceeds alert threshold {:.1}x",
                metrics.leverage, self.leverage
            ));
        }
        if metrics.max_drawdown > self.drawdown {
            alerts.push(format!(
                "Drawdown alert: {:.2}% exceeds alert threshold {:.2}%",
                metrics.max_drawdown * 100.0,
                self.drawdown * 100.0
            ));
        }
        alerts
    }
}
