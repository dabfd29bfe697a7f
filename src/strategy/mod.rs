//! Strategy and signal engine.
//!
//! Strategies implement a small capability trait: produce signals from the
//! current market view, observe position updates, and estimate the risk of a
//! position set. Configuration is owned by the engine and handed in
//! immutably on every call.

pub mod momentum;
pub mod options_strategy;

pub use momentum::MomentumStrategy;
pub use options_strategy::OptionsStrategy;

use crate::indicators::IndicatorFrame;
use crate::marketdata::{feed::IndicatorRecord, OptionQuote, Tick};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("invalid signal parameters: {0}")]
    InvalidParams(String),
    #[error("strategy failure: {0}")]
    Failed(String),
}

/// What a signal asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
    BuyCall,
    SellCall,
    BuyPut,
    SellPut,
    ClosePosition,
}

impl SignalKind {
    pub fn is_option(&self) -> bool {
        matches!(
            self,
            SignalKind::BuyCall | SignalKind::SellCall | SignalKind::BuyPut | SignalKind::SellPut
        )
    }

    /// Direction of the fill this signal produces: +1 buys, -1 sells, 0 none.
    pub fn direction(&self) -> f64 {
        match self {
            SignalKind::Buy | SignalKind::BuyCall | SignalKind::BuyPut => 1.0,
            SignalKind::Sell | SignalKind::SellCall | SignalKind::SellPut => -1.0,
            SignalKind::Hold | SignalKind::ClosePosition => 0.0,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Hold => "HOLD",
            SignalKind::BuyCall => "BUY_CALL",
            SignalKind::SellCall => "SELL_CALL",
            SignalKind::BuyPut => "BUY_PUT",
            SignalKind::SellPut => "SELL_PUT",
            SignalKind::ClosePosition => "CLOSE_POSITION",
        };
        write!(f, "{name}")
    }
}

/// Option contract addressed by an option signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub strike: f64,
    pub expiration: String,
    pub is_call: bool,
}

/// A validated trading intent emitted by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub symbol: String,
    pub kind: SignalKind,
    pub price: f64,
    pub quantity: f64,
    /// [0, 1]; the engine rejects signals below its confidence floor.
    pub confidence: f64,
    pub reason: String,
    pub timestamp: u64,
    pub option: Option<OptionLeg>,
}

impl Signal {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.symbol.trim().is_empty() {
            return Err(StrategyError::InvalidParams("empty symbol".into()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(StrategyError::InvalidParams(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.kind != SignalKind::Hold && !(self.quantity > 0.0) {
            return Err(StrategyError::InvalidParams(format!(
                "quantity must be positive for {}, got {}",
                self.kind, self.quantity
            )));
        }
        if self.kind.is_option() && self.option.is_none() {
            return Err(StrategyError::InvalidParams(format!(
                "{} signal without option contract",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Strategy families recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyType {
    Momentum,
    Straddle,
    Strangle,
    CoveredCall,
    ProtectivePut,
    IronCondor,
    Butterfly,
}

/// Engine-owned strategy configuration, exposed immutably to strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy_type: StrategyType,
    /// Unique within the engine.
    pub name: String,
    pub parameters: HashMap<String, f64>,
    pub symbols: Vec<String>,
    pub enabled: bool,
    pub max_position_size: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl StrategyConfig {
    pub fn new(strategy_type: StrategyType, name: &str, symbols: &[&str]) -> Self {
        Self {
            strategy_type,
            name: name.to_string(),
            parameters: HashMap::new(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            enabled: true,
            max_position_size: 100.0,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: f64) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn parameter(&self, key: &str, default: f64) -> f64 {
        self.parameters.get(key).copied().unwrap_or(default)
    }
}

/// One symbol's market state handed to strategies: the latest tick, the
/// locally maintained indicator frame, and any indicator record delivered by
/// the market-data collaborator. Externally supplied values win, the local
/// frame fills the gaps, and a cold indicator is `None`, never a placeholder.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub tick: &'a Tick,
    pub frame: &'a IndicatorFrame,
    pub external: Option<&'a IndicatorRecord>,
}

impl MarketView<'_> {
    pub fn rsi(&self) -> Option<f64> {
        self.external
            .map(|e| e.rsi)
            .or_else(|| self.frame.rsi().ok())
    }

    pub fn bollinger_bands(&self) -> Option<(f64, f64)> {
        self.external
            .map(|e| (e.bollinger_upper, e.bollinger_lower))
            .or_else(|| self.frame.bollinger_bands().ok())
    }

    pub fn sma_20(&self) -> Option<f64> {
        self.external
            .map(|e| e.sma_20)
            .or_else(|| self.frame.sma_20().ok())
    }

    pub fn sma_50(&self) -> Option<f64> {
        self.external
            .map(|e| e.sma_50)
            .or_else(|| self.frame.sma_50().ok())
    }

    pub fn macd(&self) -> Option<(f64, f64)> {
        self.external
            .map(|e| (e.macd, e.macd_signal))
            .or_else(|| self.frame.macd().ok())
    }
}

/// Capability set every strategy implements. No shared state, no base class:
/// each variant owns its history privately.
pub trait Strategy: Send {
    /// Produce signals from the current per-symbol market views.
    fn generate_signals(
        &mut self,
        config: &StrategyConfig,
        market: &[MarketView<'_>],
    ) -> Result<Vec<Signal>, StrategyError>;

    /// Observe a position the engine created or mutated on this strategy's
    /// behalf.
    fn update_position(&mut self, position: &Position);

    /// Strategy-specific risk estimate for a set of positions.
    fn calculate_risk(&self, positions: &[Position]) -> f64;

    /// Option-chain ingress; only option strategies care.
    fn on_option_quote(&mut self, _quote: &OptionQuote) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(kind: SignalKind, quantity: f64, confidence: f64) -> Signal {
        Signal {
            strategy_id: "test".into(),
            symbol: "AAPL".into(),
            kind,
            price: 100.0,
            quantity,
            confidence,
            reason: String::new(),
            timestamp: 0,
            option: None,
        }
    }

    #[test]
    fn validation_rules() {
        assert!(signal(SignalKind::Buy, 10.0, 0.8).validate().is_ok());
        assert!(signal(SignalKind::Hold, 0.0, 0.5).validate().is_ok());
        assert!(signal(SignalKind::Buy, 0.0, 0.8).validate().is_err());
        assert!(signal(SignalKind::Buy, 10.0, f64::NAN).validate().is_err());
        assert!(signal(SignalKind::Buy, 10.0, 1.2).validate().is_err());
        assert!(signal(SignalKind::BuyCall, 1.0, 0.8).validate().is_err());
    }

    #[test]
    fn config_parameter_defaults() {
        let config = StrategyConfig::new(StrategyType::Momentum, "momo", &["AAPL"])
            .with_parameter("momentum_threshold", 0.04);
        assert_eq!(config.parameter("momentum_threshold", 0.02), 0.04);
        assert_eq!(config.parameter("volatility_threshold", 0.03), 0.03);
    }

    #[test]
    fn signal_kind_directions() {
        assert_eq!(SignalKind::Buy.direction(), 1.0);
        assert_eq!(SignalKind::SellPut.direction(), -1.0);
        assert_eq!(SignalKind::Hold.direction(), 0.0);
        assert!(SignalKind::BuyCall.is_option());
        assert!(!SignalKind::Sell.is_option());
    }
}
