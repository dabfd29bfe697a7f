//! Portfolio risk engine.
//!
//! Consumes a consistent snapshot of the position set and produces VaR and
//! Expected Shortfall under three methods, aggregate Greeks, stress-test
//! results, and risk-limit / alert evaluations. Runs on its own cadence,
//! gated by a boolean monitoring lifecycle.

pub mod limits;
pub mod stress;
pub mod var;

pub use limits::{default_limits, AlertThresholds, LimitKind, RiskLimit};
pub use stress::{standard_scenarios, StressScenario, StressTestResult, DEFAULT_PRICE_SHOCK};
pub use var::{expected_shortfall, historical_var, parametric_var, z_score, TRADING_DAYS};

use crate::position::Position;
use crate::utils::{now_millis, sample_std_dev};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

/// Snapshot of portfolio-level risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub portfolio_value: f64,
    pub gross_exposure: f64,
    pub net_exposure: f64,
    pub leverage: f64,
    pub var_1day_95: f64,
    pub var_1day_99: f64,
    pub cvar_1day_95: f64,
    pub expected_shortfall: f64,
    /// Annualized portfolio volatility.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub beta: f64,
    pub max_drawdown: f64,
    pub timestamp: u64,
}

/// Aggregate option sensitivities; stock contributes only to delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1 vol-point.
    pub vega: f64,
}

#[derive(Debug, Clone)]
pub struct RiskEngineConfig {
    /// Fallback annualized volatility when a symbol has no return history.
    pub default_annual_vol: f64,
    /// Fallback pairwise correlation when none is supplied.
    pub default_correlation: f64,
    pub risk_free_rate: f64,
    /// Long-run expected portfolio return used in the Sharpe estimate.
    pub expected_return: f64,
    pub mc_simulations: usize,
    pub seed: u64,
    pub sample_interval: Duration,
    pub stress_interval: Duration,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            default_annual_vol: 0.20,
            default_correlation: 0.3,
            risk_free_rate: 0.02,
            expected_return: 0.08,
            mc_simulations: 10_000,
            seed: 42,
            sample_interval: Duration::from_secs(30),
            stress_interval: Duration::from_secs(300),
        }
    }
}

pub struct RiskEngine {
    config: RiskEngineConfig,
    limits: Vec<RiskLimit>,
    alerts: AlertThresholds,
    historical_returns: HashMap<String, Vec<f64>>,
    correlations: HashMap<(String, String), f64>,
    monitoring: AtomicBool,
    peak_value: f64,
    max_drawdown: f64,
}

impl RiskEngine {
    pub fn new(config: RiskEngineConfig) -> Self {
        Self {
            config,
            limits: default_limits(),
            alerts: AlertThresholds::default(),
            historical_returns: HashMap::new(),
            correlations: HashMap::new(),
            monitoring: AtomicBool::new(false),
            peak_value: 0.0,
            max_drawdown: 0.0,
        }
    }

    // --- inputs --------------------------------------------------------------

    /// Supply a daily return series for a symbol; feeds the volatility model
    /// and historical VaR.
    pub fn set_returns(&mut self, symbol: &str, returns: Vec<f64>) {
        self.historical_returns.insert(symbol.to_string(), returns);
    }

    pub fn set_correlation(&mut self, a: &str, b: &str, correlation: f64) {
        self.correlations
            .insert((a.to_string(), b.to_string()), correlation);
        self.correlations
            .insert((b.to_string(), a.to_string()), correlation);
    }

    pub fn set_limit(&mut self, limit: RiskLimit) {
        match self.limits.iter_mut().find(|l| l.kind == limit.kind) {
            Some(existing) => *existing = limit,
            None => self.limits.push(limit),
        }
    }

    pub fn set_alert_thresholds(&mut self, thresholds: AlertThresholds) {
        self.alerts = thresholds;
    }

    pub fn limits(&self) -> &[RiskLimit] {
        &self.limits
    }

    // --- core metrics --------------------------------------------------------

    /// Full portfolio risk snapshot. Also advances the drawdown tracker.
    pub fn portfolio_metrics(&mut self, positions: &[Position]) -> RiskMetrics {
        let portfolio_value: f64 = positions.iter().map(Position::market_value).sum();
        let gross_exposure: f64 = positions.iter().map(Position::exposure).sum();
        let net_exposure = portfolio_value;
        let leverage = if portfolio_value != 0.0 {
            gross_exposure / portfolio_value
        } else {
            0.0
        };

        let volatility = self.portfolio_volatility(positions);
        let var_1day_95 = parametric_var(volatility, 0.95);
        let var_1day_99 = parametric_var(volatility, 0.99);

        let simulated = self.simulate_portfolio_returns(positions, 1_000);
        let cvar_1day_95 = expected_shortfall(&simulated, 0.95);

        self.record_value(portfolio_value);

        let sharpe_ratio = if volatility > 0.0 {
            (self.config.expected_return - self.config.risk_free_rate) / volatility
        } else {
            0.0
        };

        RiskMetrics {
            portfolio_value,
            gross_exposure,
            net_exposure,
            leverage,
            var_1day_95,
            var_1day_99,
            cvar_1day_95,
            expected_shortfall: cvar_1day_95,
            volatility,
            sharpe_ratio,
            beta: 1.0,
            max_drawdown: self.max_drawdown,
            timestamp: now_millis(),
        }
    }

    /// One-day Monte-Carlo VaR: each position's return is drawn from
    /// N(0, sigma_day^2) and weighted by market value; the historical
    /// estimator is applied to the simulated P&L distribution.
    pub fn monte_carlo_var(
        &self,
        positions: &[Position],
        simulations: usize,
        confidence: f64,
    ) -> f64 {
        if positions.is_empty() || simulations == 0 {
            return 0.0;
        }
        let portfolio_value: f64 = positions.iter().map(Position::market_value).sum();
        if portfolio_value == 0.0 {
            return 0.0;
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let daily_vols: Vec<f64> = positions
            .iter()
            .map(|p| self.symbol_volatility(&p.symbol) / TRADING_DAYS.sqrt())
            .collect();
        let unit = Normal::new(0.0, 1.0).expect("unit normal");

        let mut pnls = Vec::with_capacity(simulations);
        for _ in 0..simulations {
            let mut pnl = 0.0;
            for (position, daily_vol) in positions.iter().zip(&daily_vols) {
                pnl += position.market_value() * unit.sample(&mut rng) * daily_vol;
            }
            pnls.push(pnl);
        }

        historical_var(&pnls, confidence) / portfolio_value.abs()
    }

    /// Default-size Monte-Carlo VaR.
    pub fn monte_carlo_var_default(&self, positions: &[Position], confidence: f64) -> f64 {
        self.monte_carlo_var(positions, self.config.mc_simulations, confidence)
    }

    // --- aggregate Greeks ----------------------------------------------------

    pub fn portfolio_greeks(&self, positions: &[Position]) -> PortfolioGreeks {
        let mut total = PortfolioGreeks::default();
        for position in positions {
            match &position.option {
                Some(option) => {
                    total.delta += option.greeks.delta * position.quantity;
                    total.gamma += option.greeks.gamma * position.quantity;
                    total.theta += option.greeks.theta * position.quantity;
                    total.vega += option.greeks.vega * position.quantity;
                }
                None => total.delta += position.quantity,
            }
        }
        total
    }

    // --- stress testing ------------------------------------------------------

    pub fn run_stress_tests(&mut self, positions: &[Position]) -> Vec<StressTestResult> {
        standard_scenarios()
            .iter()
            .map(|scenario| self.run_scenario(positions, scenario))
            .collect()
    }

    pub fn run_scenario(
        &mut self,
        positions: &[Position],
        scenario: &StressScenario,
    ) -> StressTestResult {
        let total_value: f64 = positions.iter().map(Position::market_value).sum();

        let mut position_pnl: HashMap<String, f64> = HashMap::new();
        let mut portfolio_pnl = 0.0;
        let mut worst_position_loss = 0.0;
        let mut worst_position_symbol = String::new();

        for position in positions {
            let shock = scenario.price_shock(&position.symbol);
            let mut pnl = position.market_value() * shock;
            if let Some(option) = &position.option {
                pnl += option.greeks.vega * position.quantity * scenario.volatility_shock;
                pnl += option.greeks.rho * position.quantity * scenario.interest_rate_shock;
            }

            *position_pnl.entry(position.symbol.clone()).or_insert(0.0) += pnl;
            portfolio_pnl += pnl;

            if pnl < worst_position_loss {
                worst_position_loss = pnl;
                worst_position_symbol = position.symbol.clone();
            }
        }

        let portfolio_return = if total_value != 0.0 {
            portfolio_pnl / total_value
        } else {
            0.0
        };

        // Re-evaluate the hard limits against the stressed portfolio.
        let stressed: Vec<Position> = positions
            .iter()
            .map(|p| {
                let mut shocked = p.clone();
                shocked.mark(p.current_price * (1.0 + scenario.price_shock(&p.symbol)));
                shocked
            })
            .collect();
        let breached_limits = self.check_limits(&stressed);

        info!(
            scenario = %scenario.name,
            portfolio_pnl,
            portfolio_return,
            worst = %worst_position_symbol,
            "stress test complete"
        );

        StressTestResult {
            scenario_name: scenario.name.clone(),
            portfolio_pnl,
            portfolio_return,
            position_pnl,
            breached_limits,
            worst_position_loss,
            worst_position_symbol,
        }
    }

    // --- limits and alerts ---------------------------------------------------

    /// Refresh every limit's current value and return the breached ones.
    pub fn check_limits(&mut self, positions: &[Position]) -> Vec<RiskLimit> {
        let portfolio_value: f64 = positions.iter().map(Position::market_value).sum();
        let gross: f64 = positions.iter().map(Position::exposure).sum();
        let var_95 = parametric_var(self.portfolio_volatility(positions), 0.95);
        let leverage = if portfolio_value != 0.0 {
            gross / portfolio_value
        } else {
            0.0
        };
        let concentration = if portfolio_value != 0.0 {
            positions
                .iter()
                .map(|p| p.exposure() / portfolio_value.abs())
                .fold(0.0, f64::max)
        } else {
            0.0
        };

        let mut breached = Vec::new();
        for limit in &mut self.limits {
            match limit.kind {
                LimitKind::PortfolioVar => limit.observe(var_95),
                LimitKind::Leverage => limit.observe(leverage),
                LimitKind::Concentration => limit.observe(concentration),
                LimitKind::Custom(_) => continue,
            }
            if limit.is_breached {
                breached.push(limit.clone());
            }
        }
        for limit in &breached {
            error!(
                kind = %limit.kind,
                current = limit.current_value,
                limit = limit.limit_value,
                utilization_pct = limit.utilization_pct,
                "risk limit breached"
            );
        }
        breached
    }

    pub fn check_alerts(&self, metrics: &RiskMetrics) -> Vec<String> {
        self.alerts.check(metrics)
    }

    // --- monitoring lifecycle ------------------------------------------------

    pub fn start_monitoring(&self) {
        self.monitoring.store(true, Ordering::SeqCst);
        info!("real-time risk monitoring started");
    }

    pub fn stop_monitoring(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
        info!("real-time risk monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Sampling loop: metrics + alerts + limits each sample interval, a full
    /// stress pass on the slower stress cadence. Honors both the cooperative
    /// stop flag and the monitoring gate every iteration.
    pub fn run_monitor<F>(&mut self, snapshot: F, stop: &AtomicBool)
    where
        F: Fn() -> Vec<Position>,
    {
        self.start_monitoring();
        let mut last_stress = Instant::now();

        while !stop.load(Ordering::Relaxed) && self.is_monitoring() {
            let positions = snapshot();
            let metrics = self.portfolio_metrics(&positions);
            for alert in self.check_alerts(&metrics) {
                warn!(alert, "risk alert");
            }
            self.check_limits(&positions);

            if last_stress.elapsed() >= self.config.stress_interval {
                self.run_stress_tests(&positions);
                last_stress = Instant::now();
            }
            std::thread::sleep(self.config.sample_interval);
        }
        self.stop_monitoring();
    }

    // --- internals -----------------------------------------------------------

    fn symbol_volatility(&self, symbol: &str) -> f64 {
        self.historical_returns
            .get(symbol)
            .filter(|r| r.len() >= 2)
            .map(|r| sample_std_dev(r) * TRADING_DAYS.sqrt())
            .unwrap_or(self.config.default_annual_vol)
    }

    fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.correlations
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(self.config.default_correlation)
    }

    /// Annualized portfolio volatility from the weighted covariance model.
    fn portfolio_volatility(&self, positions: &[Position]) -> f64 {
        let total: f64 = positions.iter().map(Position::market_value).sum();
        if positions.is_empty() || total == 0.0 {
            return self.config.default_annual_vol;
        }

        let n = positions.len();
        let weights = DVector::from_iterator(
            n,
            positions.iter().map(|p| p.market_value() / total),
        );
        let vols: Vec<f64> = positions
            .iter()
            .map(|p| self.symbol_volatility(&p.symbol))
            .collect();

        let mut covariance = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let rho = self.correlation(&positions[i].symbol, &positions[j].symbol);
                covariance[(i, j)] = vols[i] * vols[j] * rho;
            }
        }

        let variance = (weights.transpose() * &covariance * &weights)[(0, 0)];
        variance.max(0.0).sqrt()
    }

    /// Simulated one-day portfolio return distribution used for the CVaR
    /// estimate: weighted draws per position from a common daily shock scale.
    fn simulate_portfolio_returns(&self, positions: &[Position], samples: usize) -> Vec<f64> {
        let total: f64 = positions.iter().map(Position::market_value).sum();
        if positions.is_empty() || total == 0.0 {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));
        let shock = Normal::new(0.0, 0.02).expect("daily shock distribution");

        (0..samples)
            .map(|_| {
                positions
                    .iter()
                    .map(|p| p.market_value() / total * shock.sample(&mut rng))
                    .sum()
            })
            .collect()
    }

    fn record_value(&mut self, portfolio_value: f64) {
        if portfolio_value > self.peak_value {
            self.peak_value = portfolio_value;
        } else if self.peak_value > 0.0 {
            let drawdown = (self.peak_value - portfolio_value) / self.peak_value;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskEngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Greeks;
    use crate::position::{OptionPosition, Position};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn stock(symbol: &str, quantity: f64, price: f64) -> Position {
        Position::stock(symbol, quantity, price, 0)
    }

    fn option_position(symbol: &str, quantity: f64, greeks: Greeks) -> Position {
        Position::option(
            symbol,
            quantity,
            5.0,
            0,
            OptionPosition {
                strike: 100.0,
                expiration: "T+30".into(),
                is_call: true,
                greeks,
            },
        )
    }

    #[test]
    fn metrics_totals_and_leverage() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0), stock("TSLA", -500.0, 100.0)];
        let metrics = engine.portfolio_metrics(&positions);

        assert_relative_eq!(metrics.portfolio_value, 50_000.0);
        assert_relative_eq!(metrics.gross_exposure, 150_000.0);
        assert_relative_eq!(metrics.net_exposure, 50_000.0);
        assert_relative_eq!(metrics.leverage, 3.0);
    }

    #[test]
    fn var_monotonicity_invariants() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0), stock("MSFT", 800.0, 120.0)];
        let metrics = engine.portfolio_metrics(&positions);

        assert!(metrics.var_1day_99 >= metrics.var_1day_95);
        assert!(metrics.var_1day_95 >= 0.0);
        assert!(metrics.expected_shortfall >= 0.0);

        let mc_95 = engine.monte_carlo_var(&positions, 20_000, 0.95);
        let mc_99 = engine.monte_carlo_var(&positions, 20_000, 0.99);
        assert!(mc_99 >= mc_95);
        assert!(mc_95 > 0.0);
    }

    #[test]
    fn monte_carlo_var_consistent_with_parametric() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0), stock("MSFT", 833.0, 120.0)];

        let mc = engine.monte_carlo_var(&positions, 50_000, 0.95);
        let parametric = engine.portfolio_metrics(&positions).var_1day_95;
        // Same model, different estimator: agreement within 20%.
        assert!((mc - parametric).abs() / parametric < 0.2, "mc {mc} vs parametric {parametric}");
    }

    #[test]
    fn portfolio_greeks_aggregate_linearly() {
        let engine = RiskEngine::default();
        let greeks = Greeks {
            delta: 0.5,
            gamma: 0.02,
            theta: -0.01,
            vega: 0.12,
            rho: 0.05,
        };
        let positions = vec![
            stock("AAPL", 300.0, 100.0),
            option_position("AAPL", 10.0, greeks),
            option_position("TSLA", -4.0, greeks),
        ];
        let total = engine.portfolio_greeks(&positions);

        assert_relative_eq!(total.delta, 300.0 + 0.5 * 10.0 - 0.5 * 4.0);
        assert_relative_eq!(total.gamma, 0.02 * 6.0);
        assert_relative_eq!(total.theta, -0.01 * 6.0);
        assert_relative_eq!(total.vega, 0.12 * 6.0);
    }

    #[test]
    fn stress_scenario_identifies_worst_position() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0), stock("TSLA", 500.0, 200.0)];
        let scenario = StressScenario::new("Two Name Shock", "test")
            .with_price_shock("AAPL", -0.10)
            .with_price_shock("TSLA", -0.45);

        let result = engine.run_scenario(&positions, &scenario);
        assert_abs_diff_eq!(result.portfolio_pnl, -55_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.portfolio_return, -0.275, epsilon = 1e-9);
        assert_eq!(result.worst_position_symbol, "TSLA");
        assert_abs_diff_eq!(result.worst_position_loss, -45_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.position_pnl["AAPL"], -10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn stress_applies_option_vega_and_rho() {
        let mut engine = RiskEngine::default();
        let greeks = Greeks {
            delta: 0.5,
            gamma: 0.02,
            theta: -0.01,
            vega: 0.12,
            rho: 0.05,
        };
        let mut position = option_position("AAPL", 10.0, greeks);
        position.mark(5.0);
        let mut scenario = StressScenario::new("Vol Spike", "test");
        scenario.volatility_shock = 0.25;
        scenario.interest_rate_shock = 0.03;

        let result = engine.run_scenario(&[position], &scenario);
        // price: 50 * -0.05 = -2.5; vega: 0.12 * 10 * 0.25 = 0.3;
        // rho: 0.05 * 10 * 0.03 = 0.015
        assert_abs_diff_eq!(result.portfolio_pnl, -2.5 + 0.3 + 0.015, epsilon = 1e-9);
    }

    #[test]
    fn standard_stress_suite_runs_every_scenario() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0)];
        let results = engine.run_stress_tests(&positions);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.portfolio_pnl < 0.0));
    }

    #[test]
    fn oversized_position_breaches_exactly_concentration() {
        let mut engine = RiskEngine::default();
        // 90/10 split: concentration 0.9 >> 0.10 limit, leverage 1.0,
        // diversified VaR under the 2% limit.
        let positions = vec![stock("AAPL", 900.0, 100.0), stock("MSFT", 100.0, 100.0)];
        let breached = engine.check_limits(&positions);

        assert_eq!(breached.len(), 1);
        assert_eq!(breached[0].kind, LimitKind::Concentration);
        assert!(breached[0].is_breached);
        assert_relative_eq!(breached[0].current_value, 0.9);
        assert!(breached[0].utilization_pct > 100.0);
    }

    #[test]
    fn drawdown_tracked_across_samples() {
        let mut engine = RiskEngine::default();
        let high = vec![stock("AAPL", 1_000.0, 100.0)];
        let low = vec![stock("AAPL", 1_000.0, 90.0)];

        engine.portfolio_metrics(&high);
        let metrics = engine.portfolio_metrics(&low);
        assert_abs_diff_eq!(metrics.max_drawdown, 0.10, epsilon = 1e-9);
    }

    #[test]
    fn alerts_surface_before_hard_limits() {
        let mut engine = RiskEngine::default();
        let positions = vec![stock("AAPL", 1_000.0, 100.0), stock("TSLA", -800.0, 100.0)];
        let metrics = engine.portfolio_metrics(&positions);
        // Leverage (100k + 80k) / 20k = 9x: past both alert and limit.
        let alerts = engine.check_alerts(&metrics);
        assert!(alerts.iter().any(|a| a.contains("leverage")
            || a.contains("Leverage")
            || a.contains("High leverage")));
    }

    #[test]
    fn monitoring_lifecycle_flag() {
        let engine = RiskEngine::default();
        assert!(!engine.is_monitoring());
        engine.start_monitoring();
        assert!(engine.is_monitoring());
        engine.stop_monitoring();
        assert!(!engine.is_monitoring());
    }

    #[test]
    fn historical_returns_feed_symbol_volatility() {
        let mut engine = RiskEngine::default();
        // Quiet symbol: tiny realized vol lowers parametric VaR.
        engine.set_returns("AAPL", vec![0.001; 100]);
        let quiet = parametric_var(engine.symbol_volatility("AAPL"), 0.95);
        let default = parametric_var(engine.symbol_volatility("TSLA"), 0.95);
        assert!(quiet < default);
    }
}
