//! Algorithmic trading engine.
//!
//! Single-threaded scheduler over the enabled strategies. Each cycle drains
//! the ingress queue, dispatches market views to strategies, risk-validates
//! the produced signals, mutates the position set, marks it to market, and
//! samples portfolio risk on a fixed cadence. A failing strategy is logged
//! and skipped for the cycle; it never brings the loop down.

use crate::config::EngineSettings;
use crate::indicators::IndicatorFrame;
use crate::marketdata::{feed::IndicatorRecord, FeedMessage, OptionQuote, Tick};
use crate::options::{greeks, Greeks, OptionParams};
use crate::position::{OptionPosition, Position, PositionKey};
use crate::strategy::{
    MarketView, Signal, SignalKind, Strategy, StrategyConfig, StrategyError,
};
use crate::utils::now_millis;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("strategy not found: {0}")]
    NotFound(String),
    #[error("duplicate strategy name: {0}")]
    DuplicateStrategy(String),
    #[error("signal rejected: {0}")]
    RiskRejected(String),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

/// Pricing defaults used when marking option positions without a chain quote.
const MARK_VOL: f64 = 0.20;
const MARK_RATE: f64 = 0.05;
const MARK_EXPIRY_YEARS: f64 = 30.0 / 365.0;

struct StrategySlot {
    config: StrategyConfig,
    strategy: Box<dyn Strategy>,
}

/// Thread-safe producer handle for tick/options/indicator ingress. Producers
/// enqueue; only the engine thread consumes and mutates engine state.
#[derive(Clone)]
pub struct FeedHandle {
    queue: Arc<Mutex<VecDeque<FeedMessage>>>,
}

impl FeedHandle {
    pub fn push(&self, message: FeedMessage) {
        self.queue.lock().push_back(message);
    }

    /// Parse and enqueue a raw feed line; unparsable records are dropped with
    /// a warning.
    pub fn push_line(&self, line: &str) {
        match crate::marketdata::parse_line(line) {
            Ok(message) => self.push(message),
            Err(err) => warn!(%err, line, "dropping unparsable feed record"),
        }
    }
}

pub struct AlgorithmicEngine {
    settings: EngineSettings,
    strategies: Vec<StrategySlot>,
    latest_ticks: HashMap<String, Tick>,
    frames: HashMap<String, IndicatorFrame>,
    external_indicators: HashMap<String, IndicatorRecord>,
    positions: HashMap<PositionKey, Position>,
    realized_pnl: f64,
    cycles: u64,
    inbox: Arc<Mutex<VecDeque<FeedMessage>>>,
}

impl AlgorithmicEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            strategies: Vec::new(),
            latest_ticks: HashMap::new(),
            frames: HashMap::new(),
            external_indicators: HashMap::new(),
            positions: HashMap::new(),
            realized_pnl: 0.0,
            cycles: 0,
            inbox: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn feed_handle(&self) -> FeedHandle {
        FeedHandle {
            queue: Arc::clone(&self.inbox),
        }
    }

    // --- strategy management -------------------------------------------------

    pub fn add_strategy(
        &mut self,
        config: StrategyConfig,
        strategy: Box<dyn Strategy>,
    ) -> Result<(), EngineError> {
        if self.strategies.iter().any(|s| s.config.name == config.name) {
            return Err(EngineError::DuplicateStrategy(config.name));
        }
        info!(name = %config.name, "strategy added");
        self.strategies.push(StrategySlot { config, strategy });
        Ok(())
    }

    pub fn remove_strategy(&mut self, name: &str) -> Result<(), EngineError> {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.config.name != name);
        if self.strategies.len() == before {
            return Err(EngineError::NotFound(name.to_string()));
        }
        info!(name, "strategy removed");
        Ok(())
    }

    /// Toggle a strategy. Configuration is owned here; strategies only ever
    /// see it immutably.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let slot = self
            .strategies
            .iter_mut()
            .find(|s| s.config.name == name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        slot.config.enabled = enabled;
        info!(name, enabled, "strategy toggled");
        Ok(())
    }

    pub fn strategy_config(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies
            .iter()
            .find(|s| s.config.name == name)
            .map(|s| &s.config)
    }

    // --- ingress -------------------------------------------------------------

    pub fn process_message(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::MarketData(tick) => self.process_tick(tick),
            FeedMessage::Indicators(record) => {
                self.external_indicators
                    .insert(record.symbol.clone(), record);
            }
            FeedMessage::Options(quote) => self.process_option_quote(&quote),
        }
    }

    pub fn process_tick(&mut self, tick: Tick) {
        self.frames
            .entry(tick.symbol.clone())
            .or_insert_with(|| IndicatorFrame::new(&tick.symbol))
            .update(&tick);
        self.latest_ticks.insert(tick.symbol.clone(), tick);
    }

    pub fn process_option_quote(&mut self, quote: &OptionQuote) {
        for slot in &mut self.strategies {
            slot.strategy.on_option_quote(quote);
        }
    }

    fn drain_inbox(&mut self) {
        loop {
            let message = self.inbox.lock().pop_front();
            match message {
                Some(m) => self.process_message(m),
                None => break,
            }
        }
    }

    // --- cycle ---------------------------------------------------------------

    /// One dispatch/validate/execute/mark cycle. Returns the accepted signals.
    pub fn run_cycle(&mut self) -> Vec<Signal> {
        self.drain_inbox();
        self.cycles += 1;

        // Dispatch. Strategy errors are isolated per cycle.
        let mut produced: Vec<(usize, Vec<Signal>)> = Vec::new();
        {
            let Self {
                strategies,
                latest_ticks,
                frames,
                external_indicators,
                ..
            } = self;
            for (index, slot) in strategies.iter_mut().enumerate() {
                if !slot.config.enabled {
                    continue;
                }
                let views: Vec<MarketView<'_>> = slot
                    .config
                    .symbols
                    .iter()
                    .filter_map(|symbol| {
                        let tick = latest_ticks.get(symbol)?;
                        let frame = frames.get(symbol)?;
                        Some(MarketView {
                            tick,
                            frame,
                            external: external_indicators.get(symbol),
                        })
                    })
                    .collect();
                if views.is_empty() {
                    continue;
                }
                match slot.strategy.generate_signals(&slot.config, &views) {
                    Ok(signals) => produced.push((index, signals)),
                    Err(err) => {
                        error!(strategy = %slot.config.name, %err, "strategy failed; skipping for this cycle");
                    }
                }
            }
        }

        // Validate and execute.
        let mut accepted = Vec::new();
        for (index, signals) in produced {
            for signal in signals {
                match self.validate_signal(&signal) {
                    Ok(()) => {
                        self.execute_signal(index, &signal);
                        accepted.push(signal);
                    }
                    Err(err) => {
                        warn!(strategy = %signal.strategy_id, symbol = %signal.symbol, %err, "signal rejected");
                    }
                }
            }
        }

        self.mark_to_market();

        if self.cycles % self.settings.risk_sample_every_n_ticks == 0 {
            self.sample_risk();
        }

        accepted
    }

    /// Cooperative engine loop: drain, cycle, sleep; the stop flag is checked
    /// every iteration.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("algorithmic engine started");
        while !stop.load(Ordering::Relaxed) {
            self.run_cycle();
            std::thread::sleep(Duration::from_secs_f64(
                self.settings.tick_interval_seconds,
            ));
        }
        info!("algorithmic engine stopped");
    }

    // --- validation and execution -------------------------------------------

    fn validate_signal(&self, signal: &Signal) -> Result<(), EngineError> {
        signal.validate()?;

        if signal.kind == SignalKind::Hold || signal.kind == SignalKind::ClosePosition {
            return Ok(());
        }

        let position_value = signal.price * signal.quantity;
        let portfolio_value = self.portfolio_value();
        if portfolio_value > 0.0
            && position_value / portfolio_value > self.settings.max_portfolio_risk
        {
            return Err(EngineError::RiskRejected(format!(
                "position value {position_value:.2} exceeds {:.1}% of portfolio {portfolio_value:.2}",
                self.settings.max_portfolio_risk * 100.0
            )));
        }
        if signal.confidence < 0.6 {
            return Err(EngineError::RiskRejected(format!(
                "confidence {:.2} below floor",
                signal.confidence
            )));
        }
        Ok(())
    }

    fn execute_signal(&mut self, slot_index: usize, signal: &Signal) {
        let key = PositionKey {
            symbol: signal.symbol.clone(),
            option: signal
                .option
                .as_ref()
                .map(|leg| (leg.strike.to_bits(), leg.expiration.clone(), leg.is_call)),
        };

        match signal.kind {
            SignalKind::Hold => return,
            SignalKind::ClosePosition => {
                if let Some(mut position) = self.positions.remove(&key) {
                    let exit_price = position.current_price;
                    self.realized_pnl += position.apply_fill(-position.quantity, exit_price);
                    info!(symbol = %signal.symbol, "position closed");
                    self.notify_strategy(slot_index, &position);
                } else {
                    warn!(symbol = %signal.symbol, "close signal for unknown position");
                }
                return;
            }
            _ => {}
        }

        let fill = signal.kind.direction() * signal.quantity;
        let entry_time = if signal.timestamp > 0 {
            signal.timestamp
        } else {
            now_millis()
        };
        let opened = match &signal.option {
            Some(leg) => {
                let spot = self
                    .latest_ticks
                    .get(&signal.symbol)
                    .map(|t| t.price)
                    .unwrap_or(signal.price);
                Position::option(
                    &signal.symbol,
                    0.0,
                    signal.price,
                    entry_time,
                    OptionPosition {
                        strike: leg.strike,
                        expiration: leg.expiration.clone(),
                        is_call: leg.is_call,
                        greeks: contract_greeks(spot, leg.strike, leg.is_call),
                    },
                )
            }
            None => Position::stock(&signal.symbol, 0.0, signal.price, entry_time),
        };
        let position = self.positions.entry(key).or_insert(opened);

        self.realized_pnl += position.apply_fill(fill, signal.price);
        debug!(
            symbol = %signal.symbol,
            kind = %signal.kind,
            quantity = signal.quantity,
            price = signal.price,
            "signal executed"
        );

        let snapshot = position.clone();
        if snapshot.is_flat() {
            self.positions.remove(&snapshot.key());
        }
        self.notify_strategy(slot_index, &snapshot);
    }

    fn notify_strategy(&mut self, slot_index: usize, position: &Position) {
        if let Some(slot) = self.strategies.get_mut(slot_index) {
            slot.strategy.update_position(position);
        }
    }

    fn mark_to_market(&mut self) {
        for position in self.positions.values_mut() {
            let Some(tick) = self.latest_ticks.get(&position.symbol) else {
                continue;
            };
            let mark = match &position.option {
                Some(option) => crate::options::bs_price(&OptionParams::new(
                    tick.price,
                    option.strike,
                    MARK_EXPIRY_YEARS,
                    MARK_RATE,
                    MARK_VOL,
                    option.is_call,
                ))
                .unwrap_or(position.current_price),
                None => tick.price,
            };
            position.mark(mark);
        }
    }

    fn sample_risk(&self) {
        let unrealized: f64 = self.positions.values().map(|p| p.unrealized_pnl).sum();
        let total_pnl = unrealized + self.realized_pnl;
        let portfolio_value = self.portfolio_value();
        info!(
            cycle = self.cycles,
            total_pnl,
            portfolio_return = total_pnl / self.settings.starting_capital,
            gross_exposure = self.gross_exposure(),
            leverage = self.gross_exposure() / portfolio_value.max(f64::EPSILON),
            positions = self.positions.len(),
            "portfolio risk sample"
        );
    }

    // --- portfolio views -----------------------------------------------------

    pub fn portfolio_value(&self) -> f64 {
        let unrealized: f64 = self.positions.values().map(|p| p.unrealized_pnl).sum();
        self.settings.starting_capital + self.realized_pnl + unrealized
    }

    pub fn gross_exposure(&self) -> f64 {
        self.positions.values().map(|p| p.exposure()).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Consistent snapshot of the position set for the risk engine.
    pub fn positions_snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn position(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }
}

fn contract_greeks(spot: f64, strike: f64, is_call: bool) -> Greeks {
    greeks(&OptionParams::new(
        spot,
        strike,
        MARK_EXPIRY_YEARS,
        MARK_RATE,
        MARK_VOL,
        is_call,
    ))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{OptionLeg, StrategyType};

    /// Emits one fixed signal per cycle.
    struct ScriptedStrategy {
        signal: Option<Signal>,
        fail: bool,
    }

    impl ScriptedStrategy {
        fn emitting(signal: Signal) -> Self {
            Self {
                signal: Some(signal),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self { signal: None, fail: true }
        }
    }

    impl Strategy for ScriptedStrategy {
        fn generate_signals(
            &mut self,
            _config: &StrategyConfig,
            _market: &[MarketView<'_>],
        ) -> Result<Vec<Signal>, StrategyError> {
            if self.fail {
                return Err(StrategyError::Failed("scripted failure".into()));
            }
            Ok(self.signal.iter().cloned().collect())
        }

        fn update_position(&mut self, _position: &Position) {}

        fn calculate_risk(&self, _positions: &[Position]) -> f64 {
            0.0
        }
    }

    fn buy_signal(quantity: f64, confidence: f64) -> Signal {
        Signal {
            strategy_id: "scripted".into(),
            symbol: "AAPL".into(),
            kind: SignalKind::Buy,
            price: 150.0,
            quantity,
            confidence,
            reason: "test".into(),
            timestamp: 1,
            option: None,
        }
    }

    fn engine_with(signal: Signal) -> AlgorithmicEngine {
        let mut engine = AlgorithmicEngine::new(EngineSettings::default());
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "scripted", &["AAPL"]),
                Box::new(ScriptedStrategy::emitting(signal)),
            )
            .unwrap();
        engine.process_tick(Tick::new("AAPL", 150.0, 1_000.0, 1));
        engine
    }

    #[test]
    fn accepted_signal_opens_position() {
        let mut engine = engine_with(buy_signal(100.0, 0.9));
        let accepted = engine.run_cycle();
        assert_eq!(accepted.len(), 1);

        let snapshot = engine.positions_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].quantity, 100.0);
        assert_eq!(snapshot[0].average_price, 150.0);
    }

    #[test]
    fn low_confidence_signal_rejected() {
        let mut engine = engine_with(buy_signal(100.0, 0.5));
        assert!(engine.run_cycle().is_empty());
        assert!(engine.positions_snapshot().is_empty());
    }

    #[test]
    fn oversized_signal_rejected() {
        // 1000 * 150 = 150k > 2% of 1M.
        let mut engine = engine_with(buy_signal(1_000.0, 0.9));
        assert!(engine.run_cycle().is_empty());
        assert!(engine.positions_snapshot().is_empty());
    }

    #[test]
    fn failing_strategy_does_not_halt_cycle() {
        let mut engine = AlgorithmicEngine::new(EngineSettings::default());
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "bad", &["AAPL"]),
                Box::new(ScriptedStrategy::failing()),
            )
            .unwrap();
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "good", &["AAPL"]),
                Box::new(ScriptedStrategy::emitting(buy_signal(100.0, 0.9))),
            )
            .unwrap();
        engine.process_tick(Tick::new("AAPL", 150.0, 1_000.0, 1));

        let accepted = engine.run_cycle();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].strategy_id, "scripted");
    }

    #[test]
    fn disabled_strategy_is_skipped() {
        let mut engine = engine_with(buy_signal(100.0, 0.9));
        engine.set_enabled("scripted", false).unwrap();
        assert!(engine.run_cycle().is_empty());
        engine.set_enabled("scripted", true).unwrap();
        assert_eq!(engine.run_cycle().len(), 1);
        assert!(engine.set_enabled("missing", true).is_err());
    }

    #[test]
    fn duplicate_and_missing_strategy_management() {
        let mut engine = AlgorithmicEngine::new(EngineSettings::default());
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "a", &["AAPL"]),
                Box::new(ScriptedStrategy::failing()),
            )
            .unwrap();
        assert!(matches!(
            engine.add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "a", &["AAPL"]),
                Box::new(ScriptedStrategy::failing()),
            ),
            Err(EngineError::DuplicateStrategy(_))
        ));
        assert!(matches!(
            engine.remove_strategy("zzz"),
            Err(EngineError::NotFound(_))
        ));
        assert!(engine.remove_strategy("a").is_ok());
    }

    #[test]
    fn close_position_signal_removes_position() {
        let mut engine = engine_with(buy_signal(100.0, 0.9));
        engine.run_cycle();
        assert_eq!(engine.positions_snapshot().len(), 1);

        let close = Signal {
            kind: SignalKind::ClosePosition,
            ..buy_signal(100.0, 0.9)
        };
        engine.remove_strategy("scripted").unwrap();
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "closer", &["AAPL"]),
                Box::new(ScriptedStrategy::emitting(close)),
            )
            .unwrap();
        engine.run_cycle();
        assert!(engine.positions_snapshot().is_empty());
    }

    #[test]
    fn sells_accumulate_signed_quantity() {
        let mut engine = engine_with(buy_signal(100.0, 0.9));
        engine.run_cycle();

        engine.remove_strategy("scripted").unwrap();
        let sell = Signal {
            kind: SignalKind::Sell,
            ..buy_signal(40.0, 0.9)
        };
        engine
            .add_strategy(
                StrategyConfig::new(StrategyType::Momentum, "seller", &["AAPL"]),
                Box::new(ScriptedStrategy::emitting(sell)),
            )
            .unwrap();
        engine.run_cycle();

        let snapshot = engine.positions_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].quantity, 60.0);
    }

    #[test]
    fn option_positions_carry_greeks() {
        let option_signal = Signal {
            kind: SignalKind::BuyCall,
            quantity: 1.0,
            price: 5.0,
            option: Some(OptionLeg {
                strike: 150.0,
                expiration: "2024-03-15".into(),
                is_call: true,
            }),
            ..buy_signal(1.0, 0.9)
        };
        let mut engine = engine_with(option_signal);
        engine.run_cycle();

        let snapshot = engine.positions_snapshot();
        assert_eq!(snapshot.len(), 1);
        let option = snapshot[0].option.as_ref().unwrap();
        assert!(option.greeks.delta > 0.0 && option.greeks.delta < 1.0);
        assert!(option.greeks.gamma > 0.0);
    }

    #[test]
    fn mark_to_market_updates_unrealized() {
        let mut engine = engine_with(buy_signal(100.0, 0.9));
        engine.run_cycle();
        engine.process_tick(Tick::new("AAPL", 155.0, 1_000.0, 2));
        engine.run_cycle();

        let snapshot = engine.positions_snapshot();
        assert_eq!(snapshot[0].current_price, 155.0);
        assert_eq!(snapshot[0].unrealized_pnl, 500.0);
        assert!(engine.portfolio_value() > EngineSettings::default().starting_capital);
    }

    #[test]
    fn feed_handle_routes_lines() {
        let mut engine = AlgorithmicEngine::new(EngineSettings::default());
        let handle = engine.feed_handle();
        handle.push_line("MARKET_DATA,AAPL,150.25,120000,151.00,149.10,0.8");
        handle.push_line("complete garbage");
        handle.push_line("TECHNICAL_INDICATORS,AAPL,150,149,55,152,148,0.5,0.2");
        engine.run_cycle();

        assert!(engine.latest_ticks.contains_key("AAPL"));
        assert!(engine.external_indicators.contains_key("AAPL"));
    }
}
