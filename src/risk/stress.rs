//! Stress scenarios.
//!
//! A scenario shocks every position's price (per-symbol fraction, with a
//! default for unlisted symbols), and additionally hits options through their
//! vega and rho. The built-in library covers a broad crash, a rate shock, a
//! volatility spike, and a tech-sector rotation.

use super::limits::RiskLimit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price shock applied to symbols a scenario does not name.
pub const DEFAULT_PRICE_SHOCK: f64 = -0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub description: String,
    /// symbol -> fractional price shock (e.g. -0.30 for -30%).
    pub price_shocks: HashMap<String, f64>,
    /// Absolute rate move (e.g. 0.03 for +300 bps).
    pub interest_rate_shock: f64,
    /// Absolute vol move in vol points.
    pub volatility_shock: f64,
    /// Absolute adjustment to pairwise correlations.
    pub correlation_shock: f64,
}

impl StressScenario {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            price_shocks: HashMap::new(),
            interest_rate_shock: 0.0,
            volatility_shock: 0.0,
            correlation_shock: 0.0,
        }
    }

    pub fn with_price_shock(mut self, symbol: &str, shock: f64) -> Self {
        self.price_shocks.insert(symbol.to_string(), shock);
        self
    }

    pub fn price_shock(&self, symbol: &str) -> f64 {
        self.price_shocks
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_PRICE_SHOCK)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario_name: String,
    pub portfolio_pnl: f64,
    pub portfolio_return: f64,
    /// Aggregated P&L per symbol under the scenario.
    pub position_pnl: HashMap<String, f64>,
    /// Limits breached by the stressed portfolio.
    pub breached_limits: Vec<RiskLimit>,
    pub worst_position_loss: f64,
    pub worst_position_symbol: String,
}

/// The built-in scenario library.
pub fn standard_scenarios() -> Vec<StressScenario> {
    vec![
        market_crash(),
        interest_rate_shock(),
        volatility_spike(),
        sector_rotation(),
    ]
}

fn market_crash() -> StressScenario {
    let mut scenario = StressScenario::new(
        "Market Crash",
        "Severe broad-market downturn, 2008 style",
    )
    .with_price_shock("AAPL", -0.30)
    .with_price_shock("GOOGL", -0.35)
    .with_price_shock("TSLA", -0.45)
    .with_price_shock("MSFT", -0.25)
    .with_price_shock("AMZN", -0.40)
    .with_price_shock("SPY", -0.30);
    scenario.interest_rate_shock = -0.02;
    scenario.volatility_shock = 0.15;
    scenario.correlation_shock = 0.3;
    scenario
}

fn interest_rate_shock() -> StressScenario {
    let mut scenario = StressScenario::new(
        "Interest Rate Shock",
        "Sudden 300 basis point rise in rates",
    )
    .with_price_shock("AAPL", -0.10)
    .with_price_shock("GOOGL", -0.08)
    .with_price_shock("TSLA", -0.15)
    .with_price_shock("MSFT", -0.12);
    scenario.interest_rate_shock = 0.03;
    scenario.volatility_shock = 0.05;
    scenario.correlation_shock = 0.1;
    scenario
}

fn volatility_spike() -> StressScenario {
    let mut scenario = StressScenario::new(
        "Volatility Spike",
        "Vol regime jump with contained price moves",
    )
    .with_price_shock("AAPL", -0.05)
    .with_price_shock("GOOGL", -0.08)
    .with_price_shock("TSLA", -0.12);
    scenario.volatility_shock = 0.25;
    scenario.correlation_shock = 0.2;
    scenario
}

fn sector_rotation() -> StressScenario {
    let mut scenario = StressScenario::new(
        "Tech Sector Rotation",
        "Rotation out of technology into value",
    )
    .with_price_shock("AAPL", -0.20)
    .with_price_shock("GOOGL", -0.25)
    .with_price_shock("MSFT", -0.18)
    .with_price_shock("TSLA", -0.30)
    .with_price_shock("AMZN", -0.22);
    scenario.interest_rate_shock = 0.01;
    scenario.volatility_shock = 0.08;
    scenario.correlation_shock = -0.1;
    scenario
}
