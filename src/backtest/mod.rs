//! Backtest harness: replay + metrics.
//!
//! Drives a strategy over historical bars with locally computed indicators.
//! The order book is bypassed; fills are synthesized at signal price plus
//! slippage. Output is a full performance result: return/risk metrics, trade
//! statistics, and the equity and drawdown curves.

pub mod report;

pub use report::{comparison_report, performance_report};

use crate::indicators::IndicatorFrame;
use crate::marketdata::Tick;
use crate::orderbook::Side;
use crate::position::{OptionPosition, Position, PositionKey};
use crate::risk::{expected_shortfall, historical_var, TRADING_DAYS};
use crate::strategy::{OptionLeg, Signal, SignalKind, Strategy, StrategyConfig};
use crate::utils::{mean, std_dev};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no historical data for {0}")]
    NoData(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One historical bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub starting_capital: f64,
    pub commission_per_trade: f64,
    pub slippage_bps: f64,
    pub risk_free_rate: f64,
    /// Signals below this confidence are skipped, mirroring the live engine.
    pub confidence_floor: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            starting_capital: 1_000_000.0,
            commission_per_trade: 1.0,
            slippage_bps: 5.0,
            risk_free_rate: 0.02,
            confidence_floor: 0.6,
        }
    }
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub strategy_id: String,
    pub symbol: String,
    /// Direction of the position the trade closed.
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub entry_time: u64,
    pub exit_time: u64,
    pub pnl: f64,
    pub return_pct: f64,
    pub option: Option<OptionLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub start_time: u64,
    pub end_time: u64,

    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest below-peak stretch, in bars.
    pub max_drawdown_duration: usize,
    pub var_95: f64,
    pub cvar_95: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,

    pub starting_capital: f64,
    pub ending_capital: f64,
    pub peak_capital: f64,
    pub total_commission: f64,

    pub trades: Vec<BacktestTrade>,
    pub daily_returns: Vec<f64>,
    pub equity_curve: Vec<f64>,
    pub drawdown_curve: Vec<f64>,
}

/// Replay engine over per-symbol bar series.
#[derive(Debug, Default)]
pub struct BacktestEngine {
    data: HashMap<String, Vec<Bar>>,
}

impl BacktestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_series(&mut self, symbol: &str, bars: Vec<Bar>) {
        self.data.insert(symbol.to_string(), bars);
    }

    pub fn series(&self, symbol: &str) -> Option<&[Bar]> {
        self.data.get(symbol).map(Vec::as_slice)
    }

    /// Load `symbol,date,open,high,low,close,volume` rows. The date column is
    /// ignored; bars are stamped one day apart from replay start.
    pub fn load_csv(&mut self, path: impl AsRef<Path>) -> Result<usize, BacktestError> {
        let content = std::fs::read_to_string(path)?;
        let mut loaded = 0usize;
        let mut series: HashMap<String, Vec<Bar>> = HashMap::new();

        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 7 {
                warn!(line, "dropping short CSV row");
                continue;
            }
            let symbol = fields[0].trim().to_string();
            let parsed: Option<Vec<f64>> = fields[2..7]
                .iter()
                .map(|f| f.trim().parse::<f64>().ok())
                .collect();
            let Some(values) = parsed else {
                warn!(line, "dropping unparsable CSV row");
                continue;
            };
            let bars = series.entry(symbol).or_default();
            bars.push(Bar {
                timestamp: bars.len() as u64 * 86_400_000,
                open: values[0],
                high: values[1],
                low: values[2],
                close: values[3],
                volume: values[4],
            });
            loaded += 1;
        }

        for (symbol, bars) in series {
            info!(symbol = %symbol, bars = bars.len(), "historical series loaded");
            self.data.insert(symbol, bars);
        }
        Ok(loaded)
    }

    /// Replay the configured symbols through the strategy and score the run.
    pub fn run(
        &self,
        config: &BacktestConfig,
        strategy_config: &StrategyConfig,
        strategy: &mut dyn Strategy,
    ) -> Result<BacktestResult, BacktestError> {
        if config.starting_capital <= 0.0 {
            return Err(BacktestError::InvalidConfig(
                "starting capital must be positive".into(),
            ));
        }
        let symbols: Vec<&String> = strategy_config
            .symbols
            .iter()
            .filter(|s| self.data.contains_key(*s))
            .collect();
        if symbols.is_empty() {
            return Err(BacktestError::NoData(strategy_config.symbols.join(",")));
        }
        let steps = symbols
            .iter()
            .map(|s| self.data[*s].len())
            .max()
            .unwrap_or(0);

        let mut frames: HashMap<String, IndicatorFrame> = symbols
            .iter()
            .map(|s| ((*s).clone(), IndicatorFrame::new(s)))
            .collect();
        let mut sim = PortfolioSim::new(config, &strategy_config.name);
        let mut equity_curve = vec![config.starting_capital];
        let mut daily_returns = Vec::with_capacity(steps);

        for step in 0..steps {
            let mut ticks = Vec::new();
            for symbol in &symbols {
                if let Some(bar) = self.data[*symbol].get(step) {
                    let tick = Tick::new(symbol, bar.close, bar.volume, bar.timestamp)
                        .with_range(bar.high, bar.low);
                    frames.get_mut(*symbol).expect("frame per symbol").update(&tick);
                    ticks.push(tick);
                }
            }

            let views: Vec<crate::strategy::MarketView<'_>> = ticks
                .iter()
                .map(|tick| crate::strategy::MarketView {
                    tick,
                    frame: &frames[&tick.symbol],
                    external: None,
                })
                .collect();

            match strategy.generate_signals(strategy_config, &views) {
                Ok(signals) => {
                    for signal in signals {
                        if signal.validate().is_err()
                            || signal.confidence < config.confidence_floor
                        {
                            debug!(symbol = %signal.symbol, "backtest signal skipped");
                            continue;
                        }
                        sim.execute(&signal, &ticks);
                    }
                }
                Err(err) => warn!(%err, "strategy failed during replay; bar skipped"),
            }

            sim.mark(&ticks);
            let equity = sim.equity();
            let previous = *equity_curve.last().expect("seeded equity curve");
            if previous != 0.0 {
                daily_returns.push((equity - previous) / previous);
            }
            equity_curve.push(equity);
        }

        let (start_time, end_time) = (
            symbols
                .iter()
                .filter_map(|s| self.data[*s].first())
                .map(|b| b.timestamp)
                .min()
                .unwrap_or(0),
            symbols
                .iter()
                .filter_map(|s| self.data[*s].last())
                .map(|b| b.timestamp)
                .max()
                .unwrap_or(0),
        );

        Ok(score(
            config,
            &strategy_config.name,
            start_time,
            end_time,
            sim,
            equity_curve,
            daily_returns,
        ))
    }
}

/// Cash + position tracking with synthesized fills.
struct PortfolioSim<'a> {
    config: &'a BacktestConfig,
    strategy_name: String,
    cash: f64,
    positions: HashMap<PositionKey, Position>,
    trades: Vec<BacktestTrade>,
    total_commission: f64,
}

impl<'a> PortfolioSim<'a> {
    fn new(config: &'a BacktestConfig, strategy_name: &str) -> Self {
        Self {
            config,
            strategy_name: strategy_name.to_string(),
            cash: config.starting_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            total_commission: 0.0,
        }
    }

    fn slipped_price(&self, price: f64, direction: f64) -> f64 {
        price * (1.0 + direction * self.config.slippage_bps / 10_000.0)
    }

    fn execute(&mut self, signal: &Signal, ticks: &[Tick]) {
        match signal.kind {
            SignalKind::Hold => return,
            SignalKind::ClosePosition => {
                let key = key_for(signal);
                if let Some(position) = self.positions.remove(&key) {
                    let mark = ticks
                        .iter()
                        .find(|t| t.symbol == position.symbol)
                        .map(|t| t.price)
                        .unwrap_or(position.current_price);
                    let direction = -position.quantity.signum();
                    let fill_price = self.slipped_price(mark, direction);
                    let quantity = position.quantity.abs();
                    self.cash += position.quantity.signum() * quantity * fill_price
                        - self.config.commission_per_trade;
                    self.total_commission += self.config.commission_per_trade;
                    self.record_trade(&position, quantity, fill_price, signal);
                }
                return;
            }
            _ => {}
        }

        let direction = signal.kind.direction();
        let fill_price = self.slipped_price(signal.price, direction);
        let fill_quantity = direction * signal.quantity;

        self.cash -= fill_quantity * fill_price + self.config.commission_per_trade;
        self.total_commission += self.config.commission_per_trade;

        let key = key_for(signal);
        let mut position = self.positions.remove(&key).unwrap_or_else(|| {
            match &signal.option {
                Some(leg) => Position::option(
                    &signal.symbol,
                    0.0,
                    fill_price,
                    signal.timestamp,
                    OptionPosition {
                        strike: leg.strike,
                        expiration: leg.expiration.clone(),
                        is_call: leg.is_call,
                        greeks: Default::default(),
                    },
                ),
                None => Position::stock(&signal.symbol, 0.0, fill_price, signal.timestamp),
            }
        });

        // Record a round trip for whatever part of the position this fill
        // closes.
        let closing =
            position.quantity != 0.0 && position.quantity.signum() != fill_quantity.signum();
        if closing {
            let closed_quantity = fill_quantity.abs().min(position.quantity.abs());
            self.record_trade(&position.clone(), closed_quantity, fill_price, signal);
        }
        position.apply_fill(fill_quantity, fill_price);
        if !position.is_flat() {
            self.positions.insert(key, position);
        }
    }

    fn record_trade(
        &mut self,
        position: &Position,
        quantity: f64,
        exit_price: f64,
        signal: &Signal,
    ) {
        let long = position.quantity > 0.0;
        let pnl = (exit_price - position.average_price) * quantity * position.quantity.signum()
            - self.config.commission_per_trade;
        let return_pct = if position.average_price != 0.0 {
            (exit_price - position.average_price) / position.average_price
                * position.quantity.signum()
        } else {
            0.0
        };
        self.trades.push(BacktestTrade {
            strategy_id: self.strategy_name.clone(),
            symbol: position.symbol.clone(),
            side: if long { Side::Buy } else { Side::Sell },
            entry_price: position.average_price,
            exit_price,
            quantity,
            commission: self.config.commission_per_trade,
            entry_time: position.entry_time,
            exit_time: signal.timestamp,
            pnl,
            return_pct,
            option: position.option.as_ref().map(|o| OptionLeg {
                strike: o.strike,
                expiration: o.expiration.clone(),
                is_call: o.is_call,
            }),
        });
    }

    fn mark(&mut self, ticks: &[Tick]) {
        for position in self.positions.values_mut() {
            if let Some(tick) = ticks.iter().find(|t| t.symbol == position.symbol) {
                let mark = match &position.option {
                    Some(option) => crate::options::bs_price(
                        &crate::options::OptionParams::new(
                            tick.price,
                            option.strike,
                            30.0 / 365.0,
                            0.05,
                            0.20,
                            option.is_call,
                        ),
                    )
                    .unwrap_or(position.current_price),
                    None => tick.price,
                };
                position.mark(mark);
            }
        }
    }

    fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(Position::market_value)
                .sum::<f64>()
    }
}

fn key_for(signal: &Signal) -> PositionKey {
    PositionKey {
        symbol: signal.symbol.clone(),
        option: signal
            .option
            .as_ref()
            .map(|leg| (leg.strike.to_bits(), leg.expiration.clone(), leg.is_call)),
    }
}

fn score(
    config: &BacktestConfig,
    strategy_name: &str,
    start_time: u64,
    end_time: u64,
    sim: PortfolioSim<'_>,
    equity_curve: Vec<f64>,
    daily_returns: Vec<f64>,
) -> BacktestResult {
    let starting_capital = config.starting_capital;
    let ending_capital = *equity_curve.last().unwrap_or(&starting_capital);
    let peak_capital = equity_curve.iter().copied().fold(f64::MIN, f64::max);

    let total_return = (ending_capital - starting_capital) / starting_capital;
    let annualized_return = (1.0 + total_return).powf(365.0 / TRADING_DAYS) - 1.0;

    let daily_std = std_dev(&daily_returns);
    let volatility = daily_std * TRADING_DAYS.sqrt();
    let daily_rf = config.risk_free_rate / TRADING_DAYS;
    let mean_return = mean(&daily_returns);
    let sharpe_ratio = if daily_std > 0.0 {
        (mean_return - daily_rf) / daily_std
    } else {
        0.0
    };

    let downside: Vec<f64> = daily_returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino_ratio = if downside.is_empty() {
        0.0
    } else {
        let downside_dev =
            (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
        if downside_dev > 0.0 {
            (mean_return - daily_rf) / downside_dev
        } else {
            0.0
        }
    };

    let (max_drawdown, max_drawdown_duration, drawdown_curve) = drawdowns(&equity_curve);
    let var_95 = historical_var(&daily_returns, 0.95);
    let cvar_95 = expected_shortfall(&daily_returns, 0.95);

    let trades = sim.trades;
    let winning: Vec<&BacktestTrade> = trades.iter().filter(|t| t.pnl > 0.0).collect();
    let losing: Vec<&BacktestTrade> = trades.iter().filter(|t| t.pnl <= 0.0).collect();
    let total_wins: f64 = winning.iter().map(|t| t.pnl).sum();
    let total_losses: f64 = losing.iter().map(|t| t.pnl.abs()).sum();

    BacktestResult {
        strategy_name: strategy_name.to_string(),
        start_time,
        end_time,
        total_return,
        annualized_return,
        volatility,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown,
        max_drawdown_duration,
        var_95,
        cvar_95,
        total_trades: trades.len(),
        winning_trades: winning.len(),
        losing_trades: losing.len(),
        win_rate: if trades.is_empty() {
            0.0
        } else {
            winning.len() as f64 / trades.len() as f64
        },
        avg_win: if winning.is_empty() {
            0.0
        } else {
            total_wins / winning.len() as f64
        },
        avg_loss: if losing.is_empty() {
            0.0
        } else {
            total_losses / losing.len() as f64
        },
        profit_factor: if total_losses > 0.0 {
            total_wins / total_losses
        } else {
            0.0
        },
        largest_win: winning.iter().map(|t| t.pnl).fold(0.0, f64::max),
        largest_loss: losing.iter().map(|t| t.pnl).fold(0.0, f64::min),
        starting_capital,
        ending_capital,
        peak_capital,
        total_commission: sim.total_commission,
        trades,
        daily_returns,
        equity_curve,
        drawdown_curve,
    }
}

fn drawdowns(equity_curve: &[f64]) -> (f64, usize, Vec<f64>) {
    if equity_curve.is_empty() {
        return (0.0, 0, Vec::new());
    }
    let mut peak = equity_curve[0];
    let mut peak_index = 0usize;
    let mut max_drawdown = 0.0;
    let mut max_duration = 0usize;
    let mut curve = Vec::with_capacity(equity_curve.len());

    for (i, &value) in equity_curve.iter().enumerate() {
        if value > peak {
            peak = value;
            peak_index = i;
        }
        let drawdown = if peak > 0.0 { (peak - value) / peak } else { 0.0 };
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
        if drawdown > 0.0 {
            max_duration = max_duration.max(i - peak_index);
        }
        curve.push(drawdown);
    }
    (max_drawdown, max_duration, curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{MarketView, StrategyError, StrategyType};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// Buys on one bar, closes on a later bar.
    struct RoundTripStrategy {
        buy_step: usize,
        close_step: usize,
        step: usize,
        quantity: f64,
    }

    impl RoundTripStrategy {
        fn new(buy_step: usize, close_step: usize, quantity: f64) -> Self {
            Self {
                buy_step,
                close_step,
                step: 0,
                quantity,
            }
        }
    }

    impl Strategy for RoundTripStrategy {
        fn generate_signals(
            &mut self,
            config: &StrategyConfig,
            market: &[MarketView<'_>],
        ) -> Result<Vec<Signal>, StrategyError> {
            let step = self.step;
            self.step += 1;
            let Some(view) = market.first() else {
                return Ok(Vec::new());
            };
            let kind = if step == self.buy_step {
                SignalKind::Buy
            } else if step == self.close_step {
                SignalKind::ClosePosition
            } else {
                return Ok(Vec::new());
            };
            Ok(vec![Signal {
                strategy_id: config.name.clone(),
                symbol: view.tick.symbol.clone(),
                kind,
                price: view.tick.price,
                quantity: self.quantity,
                confidence: 0.9,
                reason: "scripted".into(),
                timestamp: view.tick.timestamp,
                option: None,
            }])
        }

        fn update_position(&mut self, _position: &Position) {}

        fn calculate_risk(&self, _positions: &[Position]) -> f64 {
            0.0
        }
    }

    fn linear_bars(n: usize, start: f64, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = start + i as f64 * step;
                Bar {
                    timestamp: i as u64 * 86_400_000,
                    open: close - step,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10_000.0,
                }
            })
            .collect()
    }

    fn run_round_trip() -> BacktestResult {
        let mut engine = BacktestEngine::new();
        engine.add_series("AAPL", linear_bars(30, 100.0, 1.0));
        let config = BacktestConfig {
            slippage_bps: 0.0,
            commission_per_trade: 0.0,
            ..BacktestConfig::default()
        };
        let strategy_config = StrategyConfig::new(StrategyType::Momentum, "round-trip", &["AAPL"]);
        let mut strategy = RoundTripStrategy::new(5, 25, 100.0);
        engine.run(&config, &strategy_config, &mut strategy).unwrap()
    }

    #[test]
    fn profitable_round_trip_books_gain() {
        let result = run_round_trip();
        // Bought at 105, closed at 125: +$2000 on 100 shares.
        assert_eq!(result.total_trades, 1);
        assert_eq!(result.winning_trades, 1);
        assert_relative_eq!(result.trades[0].entry_price, 105.0);
        assert_relative_eq!(result.trades[0].exit_price, 125.0);
        assert_abs_diff_eq!(result.trades[0].pnl, 2_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            result.ending_capital,
            result.starting_capital + 2_000.0,
            epsilon = 1e-6
        );
        assert_relative_eq!(result.win_rate, 1.0);
    }

    #[test]
    fn equity_curve_shape_and_return_consistency() {
        let result = run_round_trip();
        assert_eq!(result.equity_curve.len(), 31);
        assert_eq!(result.drawdown_curve.len(), 31);
        assert_relative_eq!(result.equity_curve[0], result.starting_capital);
        assert_abs_diff_eq!(
            result.total_return,
            (result.ending_capital - result.starting_capital) / result.starting_capital,
            epsilon = 1e-12
        );
        assert!(result.peak_capital >= result.ending_capital - 1e-9);
        assert!(result.max_drawdown >= 0.0);
        assert!(result.var_95 >= 0.0);
        assert!(result.cvar_95 >= result.var_95 - 1e-12);
    }

    #[test]
    fn commission_and_slippage_reduce_pnl() {
        let mut engine = BacktestEngine::new();
        engine.add_series("AAPL", linear_bars(30, 100.0, 1.0));
        let config = BacktestConfig {
            slippage_bps: 10.0,
            commission_per_trade: 5.0,
            ..BacktestConfig::default()
        };
        let strategy_config = StrategyConfig::new(StrategyType::Momentum, "costly", &["AAPL"]);
        let mut strategy = RoundTripStrategy::new(5, 25, 100.0);
        let result = engine.run(&config, &strategy_config, &mut strategy).unwrap();

        let frictionless = run_round_trip();
        assert!(result.trades[0].pnl < frictionless.trades[0].pnl);
        assert_relative_eq!(result.total_commission, 10.0);
    }

    #[test]
    fn low_confidence_signals_skipped_in_replay() {
        struct Hesitant;
        impl Strategy for Hesitant {
            fn generate_signals(
                &mut self,
                config: &StrategyConfig,
                market: &[MarketView<'_>],
            ) -> Result<Vec<Signal>, StrategyError> {
                Ok(market
                    .iter()
                    .map(|view| Signal {
                        strategy_id: config.name.clone(),
                        symbol: view.tick.symbol.clone(),
                        kind: SignalKind::Buy,
                        price: view.tick.price,
                        quantity: 10.0,
                        confidence: 0.4,
                        reason: "weak".into(),
                        timestamp: view.tick.timestamp,
                        option: None,
                    })
                    .collect())
            }
            fn update_position(&mut self, _position: &Position) {}
            fn calculate_risk(&self, _positions: &[Position]) -> f64 {
                0.0
            }
        }

        let mut engine = BacktestEngine::new();
        engine.add_series("AAPL", linear_bars(10, 100.0, 1.0));
        let strategy_config = StrategyConfig::new(StrategyType::Momentum, "weak", &["AAPL"]);
        let result = engine
            .run(&BacktestConfig::default(), &strategy_config, &mut Hesitant)
            .unwrap();
        assert_eq!(result.total_trades, 0);
        assert_relative_eq!(result.ending_capital, result.starting_capital);
    }

    #[test]
    fn missing_data_is_an_error() {
        let engine = BacktestEngine::new();
        let strategy_config = StrategyConfig::new(StrategyType::Momentum, "none", &["ZZZ"]);
        let mut strategy = RoundTripStrategy::new(0, 1, 1.0);
        assert!(matches!(
            engine.run(&BacktestConfig::default(), &strategy_config, &mut strategy),
            Err(BacktestError::NoData(_))
        ));
    }

    #[test]
    fn drawdown_math_on_known_curve() {
        let curve = vec![100.0, 110.0, 99.0, 104.5, 121.0, 115.0];
        let (max_dd, duration, dd_curve) = drawdowns(&curve);
        assert_abs_diff_eq!(max_dd, 0.10, epsilon = 1e-12);
        assert_eq!(duration, 2);
        assert_relative_eq!(dd_curve[2], 0.10);
        assert_relative_eq!(dd_curve[4], 0.0);
    }
}
