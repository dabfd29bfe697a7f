//! Momentum strategy.
//!
//! Keeps a bounded per-symbol price history and trades three regimes in
//! strict order: trend continuation, Bollinger breakouts, and mean reversion
//! after an extreme move. The first matching rule wins for each tick.

use super::{MarketView, Signal, SignalKind, Strategy, StrategyConfig, StrategyError};
use crate::position::Position;
use crate::utils::std_dev;
use std::collections::{HashMap, VecDeque};

const MAX_HISTORY: usize = 50;
const MIN_POINTS: usize = 20;
const SHORT_LOOKBACK: usize = 5;
const LONG_LOOKBACK: usize = 20;
const BREAKOUT_VOLUME: f64 = 1000.0;

#[derive(Debug, Clone, Default)]
struct PriceHistory {
    points: VecDeque<(u64, f64)>,
}

impl PriceHistory {
    fn push(&mut self, timestamp: u64, price: f64) {
        if self.points.len() == MAX_HISTORY {
            self.points.pop_front();
        }
        self.points.push_back((timestamp, price));
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn price(&self, back: usize) -> Option<f64> {
        let idx = self.points.len().checked_sub(back + 1)?;
        self.points.get(idx).map(|(_, p)| *p)
    }

    /// Fractional move over the last `lookback` periods.
    fn momentum(&self, lookback: usize) -> Option<f64> {
        let current = self.price(0)?;
        let past = self.price(lookback)?;
        Some((current - past) / past)
    }

    /// Standard deviation of the arithmetic returns over the last `lookback`
    /// prices.
    fn volatility(&self, lookback: usize) -> Option<f64> {
        if self.points.len() < lookback {
            return None;
        }
        let prices: Vec<f64> = self
            .points
            .iter()
            .skip(self.points.len() - lookback)
            .map(|(_, p)| *p)
            .collect();
        let returns: Vec<f64> = prices
            .windows(2)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        if returns.is_empty() {
            return None;
        }
        Some(std_dev(&returns))
    }
}

/// Trend/breakout/reversion momentum trading over bounded price history.
#[derive(Debug, Default)]
pub struct MomentumStrategy {
    history: HashMap<String, PriceHistory>,
    positions: Vec<Position>,
}

impl MomentumStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions the engine has reported back to this strategy.
    pub fn tracked_positions(&self) -> &[Position] {
        &self.positions
    }

    fn signal(
        config: &StrategyConfig,
        view: &MarketView<'_>,
        kind: SignalKind,
        confidence: f64,
        reason: &str,
    ) -> Signal {
        Signal {
            strategy_id: config.name.clone(),
            symbol: view.tick.symbol.clone(),
            kind,
            price: view.tick.price,
            quantity: config.max_position_size,
            confidence,
            reason: reason.to_string(),
            timestamp: view.tick.timestamp,
            option: None,
        }
    }

    fn evaluate(
        &mut self,
        config: &StrategyConfig,
        view: &MarketView<'_>,
    ) -> Option<Signal> {
        let tick = view.tick;
        let history = self.history.entry(tick.symbol.clone()).or_default();
        history.push(tick.timestamp, tick.price);

        if history.len() < MIN_POINTS {
            return None;
        }

        let short = history.momentum(SHORT_LOOKBACK)?;
        let long = history.momentum(LONG_LOOKBACK).unwrap_or(0.0);
        let volatility = history.volatility(LONG_LOOKBACK)?;

        let momentum_threshold = config.parameter("momentum_threshold", 0.02);
        let volatility_threshold = config.parameter("volatility_threshold", 0.03);
        let overbought = config.parameter("rsi_overbought", 70.0);
        let oversold = config.parameter("rsi_oversold", 30.0);

        let rsi = view.rsi();
        let bands = view.bollinger_bands();

        // Trend continuation. A cold RSI is neutral: it does not veto.
        if short > momentum_threshold && long > 0.0 && volatility < volatility_threshold {
            if rsi.map_or(true, |r| r < overbought) {
                let confidence = (0.5 + short * 10.0).min(0.95);
                return Some(Self::signal(
                    config,
                    view,
                    SignalKind::Buy,
                    confidence,
                    "strong upward momentum",
                ));
            }
        } else if short < -momentum_threshold && long < 0.0 && volatility < volatility_threshold {
            if rsi.map_or(true, |r| r > oversold) {
                let confidence = (0.5 + short.abs() * 10.0).min(0.95);
                return Some(Self::signal(
                    config,
                    view,
                    SignalKind::Sell,
                    confidence,
                    "strong downward momentum",
                ));
            }
        }

        // Bollinger breakout with volume confirmation.
        if let Some((upper, lower)) = bands {
            if tick.volume > BREAKOUT_VOLUME {
                if tick.price > upper {
                    return Some(Self::signal(
                        config,
                        view,
                        SignalKind::Buy,
                        0.75,
                        "Bollinger breakout above upper band",
                    ));
                }
                if tick.price < lower {
                    return Some(Self::signal(
                        config,
                        view,
                        SignalKind::Sell,
                        0.75,
                        "Bollinger breakout below lower band",
                    ));
                }
            }
        }

        // Mean reversion after an extreme move; requires a warm RSI.
        if short.abs() > momentum_threshold * 2.0 && volatility > volatility_threshold {
            if short > 0.0 && rsi.map_or(false, |r| r > 80.0) {
                return Some(Self::signal(
                    config,
                    view,
                    SignalKind::Sell,
                    0.65,
                    "mean reversion after extreme upward move",
                ));
            }
            if short < 0.0 && rsi.map_or(false, |r| r < 20.0) {
                return Some(Self::signal(
                    config,
                    view,
                    SignalKind::Buy,
                    0.65,
                    "mean reversion after extreme downward move",
                ));
            }
        }

        None
    }
}

impl Strategy for MomentumStrategy {
    fn generate_signals(
        &mut self,
        config: &StrategyConfig,
        market: &[MarketView<'_>],
    ) -> Result<Vec<Signal>, StrategyError> {
        let mut signals = Vec::new();
        for view in market {
            if let Some(signal) = self.evaluate(config, view) {
                signal.validate()?;
                signals.push(signal);
            }
        }
        Ok(signals)
    }

    fn update_position(&mut self, position: &Position) {
        match self
            .positions
            .iter_mut()
            .find(|p| p.key() == position.key())
        {
            Some(existing) => *existing = position.clone(),
            None => self.positions.push(position.clone()),
        }
    }

    fn calculate_risk(&self, positions: &[Position]) -> f64 {
        positions
            .iter()
            .map(|position| {
                let volatility = self
                    .history
                    .get(&position.symbol)
                    .and_then(|h| h.volatility(LONG_LOOKBACK))
                    .unwrap_or(0.0);
                position.exposure() * volatility
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorFrame;
    use crate::marketdata::feed::IndicatorRecord;
    use crate::marketdata::Tick;

    fn config() -> StrategyConfig {
        StrategyConfig::new(super::super::StrategyType::Momentum, "momo", &["AAPL"])
            .with_parameter("momentum_threshold", 0.02)
            .with_parameter("volatility_threshold", 0.03)
    }

    fn external(rsi: f64, upper: f64, lower: f64) -> IndicatorRecord {
        IndicatorRecord {
            symbol: "AAPL".into(),
            sma_20: 0.0,
            sma_50: 0.0,
            rsi,
            bollinger_upper: upper,
            bollinger_lower: lower,
            macd: 0.0,
            macd_signal: 0.0,
        }
    }

    fn run_series(
        strategy: &mut MomentumStrategy,
        prices: &[f64],
        rsi: f64,
    ) -> Vec<Vec<Signal>> {
        let config = config();
        let mut out = Vec::new();
        let frame = IndicatorFrame::new("AAPL");
        for (i, price) in prices.iter().enumerate() {
            let tick = Tick::new("AAPL", *price, 5_000.0, i as u64);
            let record = external(rsi, price * 1.5, price * 0.5);
            let views = [MarketView {
                tick: &tick,
                frame: &frame,
                external: Some(&record),
            }];
            out.push(strategy.generate_signals(&config, &views).unwrap());
        }
        out
    }

    #[test]
    fn silent_before_twenty_points() {
        let mut strategy = MomentumStrategy::new();
        let prices: Vec<f64> = (0..19).map(|i| 100.0 + i as f64 * 0.01).collect();
        let signals = run_series(&mut strategy, &prices, 50.0);
        assert!(signals.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn sustained_rise_emits_high_confidence_buy() {
        let mut strategy = MomentumStrategy::new();
        // 20 quiet points, then five +3% ticks.
        let mut prices: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let mut last = *prices.last().unwrap();
        for _ in 0..5 {
            last *= 1.03;
            prices.push(last);
        }
        let per_tick = run_series(&mut strategy, &prices, 55.0);

        let final_signals = per_tick.last().unwrap();
        assert_eq!(final_signals.len(), 1);
        let signal = &final_signals[0];
        assert_eq!(signal.kind, SignalKind::Buy);
        assert!(signal.confidence >= 0.8, "confidence {}", signal.confidence);
        assert_eq!(signal.quantity, config().max_position_size);
    }

    #[test]
    fn overbought_rsi_vetoes_trend_buy() {
        let mut strategy = MomentumStrategy::new();
        let mut prices: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let mut last = *prices.last().unwrap();
        for _ in 0..5 {
            last *= 1.03;
            prices.push(last);
        }
        // RSI pinned above the overbought threshold; bands far away, and the
        // realized volatility is below the reversion gate, so nothing fires.
        let per_tick = run_series(&mut strategy, &prices, 85.0);
        assert!(per_tick.last().unwrap().is_empty());
    }

    #[test]
    fn downward_momentum_emits_sell() {
        let mut strategy = MomentumStrategy::new();
        let mut prices: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let mut last = *prices.last().unwrap();
        for _ in 0..5 {
            last *= 0.975;
            prices.push(last);
        }
        let per_tick = run_series(&mut strategy, &prices, 45.0);
        let final_signals = per_tick.last().unwrap();
        assert_eq!(final_signals.len(), 1);
        assert_eq!(final_signals[0].kind, SignalKind::Sell);
    }

    #[test]
    fn breakout_rule_fires_on_band_cross() {
        let mut strategy = MomentumStrategy::new();
        let config = config();
        let frame = IndicatorFrame::new("AAPL");
        // Warm the history with quiet prices.
        for i in 0..24 {
            let price = 100.0 + if i % 2 == 0 { 0.05 } else { -0.05 };
            let tick = Tick::new("AAPL", price, 5_000.0, i);
            let record = external(72.0, 101.0, 99.0);
            let views = [MarketView {
                tick: &tick,
                frame: &frame,
                external: Some(&record),
            }];
            assert!(strategy.generate_signals(&config, &views).unwrap().is_empty());
        }
        // Price pierces the upper band with volume; RSI 72 vetoes the trend
        // rule but not the breakout rule.
        let tick = Tick::new("AAPL", 101.5, 5_000.0, 99);
        let record = external(72.0, 101.0, 99.0);
        let views = [MarketView {
            tick: &tick,
            frame: &frame,
            external: Some(&record),
        }];
        let signals = strategy.generate_signals(&config, &views).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].confidence, 0.75);
    }

    #[test]
    fn risk_scales_with_exposure_and_volatility() {
        let mut strategy = MomentumStrategy::new();
        let prices: Vec<f64> = (0..30).map(|i| 100.0 * (1.0 + 0.01 * (i % 3) as f64)).collect();
        run_series(&mut strategy, &prices, 50.0);

        let position = Position::stock("AAPL", 100.0, 100.0, 0);
        let risk = strategy.calculate_risk(&[position]);
        assert!(risk > 0.0);
        assert_eq!(strategy.calculate_risk(&[]), 0.0);
    }
}
