//! Multi-leg options strategies.
//!
//! One strategy struct dispatches on the configured type: straddle, strangle,
//! covered call, protective put, iron condor, and butterfly. Legs are priced
//! with the Black-Scholes core, using the chain's implied vol for the strike
//! when known and a 20% placeholder otherwise.

use super::{
    MarketView, OptionLeg, Signal, SignalKind, Strategy, StrategyConfig, StrategyError,
    StrategyType,
};
use crate::marketdata::{OptionChain, OptionQuote};
use crate::options::{bs_price, OptionParams};
use crate::position::Position;
use std::collections::HashMap;
use tracing::debug;

/// IV level separating the low-vol and high-vol playbooks.
const HIGH_IV_THRESHOLD: f64 = 0.25;
/// Placeholder volatility when the chain has no quote for a strike.
const FALLBACK_VOL: f64 = 0.20;
/// Pricing horizon when the chain carries no expiration: 30 calendar days.
const DEFAULT_EXPIRY_YEARS: f64 = 30.0 / 365.0;
const DEFAULT_EXPIRATION: &str = "T+30";
const RISK_FREE_RATE: f64 = 0.05;

#[derive(Debug, Default)]
pub struct OptionsStrategy {
    chains: HashMap<String, OptionChain>,
    positions: Vec<Position>,
}

impl OptionsStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self, symbol: &str) -> Option<&OptionChain> {
        self.chains.get(symbol)
    }

    fn is_high_volatility(&self, symbol: &str) -> bool {
        self.chain(symbol)
            .and_then(OptionChain::mean_implied_vol)
            .map_or(false, |iv| iv > HIGH_IV_THRESHOLD)
    }

    fn is_low_volatility(&self, symbol: &str) -> bool {
        !self.is_high_volatility(symbol)
    }

    fn expiration(&self, symbol: &str) -> String {
        self.chain(symbol)
            .filter(|c| !c.expiration.is_empty())
            .map(|c| c.expiration.clone())
            .unwrap_or_else(|| DEFAULT_EXPIRATION.to_string())
    }

    fn strike_vol(&self, symbol: &str, strike: f64) -> f64 {
        self.chain(symbol)
            .and_then(|chain| {
                chain
                    .strikes
                    .iter()
                    .position(|s| (*s - strike).abs() < 1e-9)
                    .map(|i| chain.implied_vols[i])
            })
            .unwrap_or(FALLBACK_VOL)
    }

    fn leg_price(&self, symbol: &str, spot: f64, strike: f64, is_call: bool) -> f64 {
        let params = OptionParams::new(
            spot,
            strike,
            DEFAULT_EXPIRY_YEARS,
            RISK_FREE_RATE,
            self.strike_vol(symbol, strike),
            is_call,
        );
        bs_price(&params).unwrap_or(0.0)
    }

    fn owns_stock(&self, symbol: &str) -> bool {
        self.positions
            .iter()
            .any(|p| p.symbol == symbol && !p.is_option() && p.quantity > 0.0)
    }

    fn leg(
        &self,
        config: &StrategyConfig,
        view: &MarketView<'_>,
        kind: SignalKind,
        strike: f64,
        quantity: f64,
        confidence: f64,
        reason: &str,
    ) -> Signal {
        let symbol = &view.tick.symbol;
        let is_call = matches!(kind, SignalKind::BuyCall | SignalKind::SellCall);
        Signal {
            strategy_id: config.name.clone(),
            symbol: symbol.clone(),
            kind,
            price: self.leg_price(symbol, view.tick.price, strike, is_call),
            quantity,
            confidence,
            reason: reason.to_string(),
            timestamp: view.tick.timestamp,
            option: Some(OptionLeg {
                strike,
                expiration: self.expiration(symbol),
                is_call,
            }),
        }
    }

    fn straddle(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // Long ATM call + put: positioned for a volatility expansion.
        let symbol = &view.tick.symbol;
        if !self.is_low_volatility(symbol) {
            return Vec::new();
        }
        let Some(atm) = self.chain(symbol).and_then(|c| c.atm_strike(view.tick.price)) else {
            return Vec::new();
        };
        let contracts = config.parameter("contracts", 1.0);
        vec![
            self.leg(
                config,
                view,
                SignalKind::BuyCall,
                atm,
                contracts,
                0.75,
                "long straddle, cheap volatility",
            ),
            self.leg(
                config,
                view,
                SignalKind::BuyPut,
                atm,
                contracts,
                0.75,
                "long straddle, cheap volatility",
            ),
        ]
    }

    fn strangle(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // Long OTM call + put: cheaper than the straddle, needs a bigger move.
        let symbol = &view.tick.symbol;
        if !self.is_low_volatility(symbol) {
            return Vec::new();
        }
        let spot = view.tick.price;
        let contracts = config.parameter("contracts", 1.0);
        vec![
            self.leg(
                config,
                view,
                SignalKind::BuyCall,
                spot * 1.05,
                contracts,
                0.70,
                "long strangle, expecting a large move",
            ),
            self.leg(
                config,
                view,
                SignalKind::BuyPut,
                spot * 0.95,
                contracts,
                0.70,
                "long strangle, expecting a large move",
            ),
        ]
    }

    fn covered_call(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // Income against an existing stock position once the name runs hot.
        let symbol = &view.tick.symbol;
        let rsi_hot = view.rsi().map_or(false, |r| r > 60.0);
        if !self.owns_stock(symbol) || !rsi_hot {
            return Vec::new();
        }
        let contracts = config.parameter("contracts", 1.0);
        vec![self.leg(
            config,
            view,
            SignalKind::SellCall,
            view.tick.price * 1.03,
            contracts,
            0.80,
            "covered call against stock position",
        )]
    }

    fn protective_put(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // Downside insurance when implied vol is elevated.
        let symbol = &view.tick.symbol;
        if !self.owns_stock(symbol) || !self.is_high_volatility(symbol) {
            return Vec::new();
        }
        let contracts = config.parameter("contracts", 1.0);
        vec![self.leg(
            config,
            view,
            SignalKind::BuyPut,
            view.tick.price * 0.95,
            contracts,
            0.85,
            "protective put hedging stock position",
        )]
    }

    fn iron_condor(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // Sell the body, buy the wings: short richly priced vol in a
        // range-bound market.
        let symbol = &view.tick.symbol;
        let neutral = view.rsi().map_or(false, |r| r > 40.0 && r < 60.0);
        if !self.is_high_volatility(symbol) || !neutral {
            return Vec::new();
        }
        let spot = view.tick.price;
        let contracts = config.parameter("contracts", 1.0);
        vec![
            self.leg(
                config,
                view,
                SignalKind::SellCall,
                spot * 1.01,
                contracts,
                0.75,
                "iron condor short call body",
            ),
            self.leg(
                config,
                view,
                SignalKind::SellPut,
                spot * 0.99,
                contracts,
                0.75,
                "iron condor short put body",
            ),
            self.leg(
                config,
                view,
                SignalKind::BuyCall,
                spot * 1.05,
                contracts,
                0.75,
                "iron condor call wing",
            ),
            self.leg(
                config,
                view,
                SignalKind::BuyPut,
                spot * 0.95,
                contracts,
                0.75,
                "iron condor put wing",
            ),
        ]
    }

    fn butterfly(&self, config: &StrategyConfig, view: &MarketView<'_>) -> Vec<Signal> {
        // 1-2-1 call butterfly centered at the money. The middle leg is two
        // short contracts.
        let neutral = view.rsi().map_or(false, |r| r > 45.0 && r < 55.0);
        if !neutral {
            return Vec::new();
        }
        let spot = view.tick.price;
        let atm = self
            .chain(&view.tick.symbol)
            .and_then(|c| c.atm_strike(spot))
            .unwrap_or(spot);
        let contracts = config.parameter("contracts", 1.0);
        vec![
            self.leg(
                config,
                view,
                SignalKind::BuyCall,
                spot * 0.97,
                contracts,
                0.70,
                "butterfly lower wing",
            ),
            self.leg(
                config,
                view,
                SignalKind::SellCall,
                atm,
                contracts * 2.0,
                0.70,
                "butterfly short body",
            ),
            self.leg(
                config,
                view,
                SignalKind::BuyCall,
                spot * 1.03,
                contracts,
                0.70,
                "butterfly upper wing",
            ),
        ]
    }
}

impl Strategy for OptionsStrategy {
    fn generate_signals(
        &mut self,
        config: &StrategyConfig,
        market: &[MarketView<'_>],
    ) -> Result<Vec<Signal>, StrategyError> {
        let mut signals = Vec::new();
        for view in market {
            let legs = match config.strategy_type {
                StrategyType::Straddle => self.straddle(config, view),
                StrategyType::Strangle => self.strangle(config, view),
                StrategyType::CoveredCall => self.covered_call(config, view),
                StrategyType::ProtectivePut => self.protective_put(config, view),
                StrategyType::IronCondor => self.iron_condor(config, view),
                StrategyType::Butterfly => self.butterfly(config, view),
                StrategyType::Momentum => {
                    return Err(StrategyError::Failed(format!(
                        "{} is not an options strategy type",
                        config.name
                    )))
                }
            };
            for leg in &legs {
                leg.validate()?;
            }
            signals.extend(legs);
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
                if position.is_option() {
                    if position.quantity > 0.0 {
                        // Long option risk is capped at the premium paid.
                        position.quantity * position.average_price
                    } else {
                        // Short options carry open-ended risk; weight the
                        // mark heavily.
                        position.quantity.abs() * position.current_price * 2.0
                    }
                } else {
                    position.exposure() * 0.2
                }
            })
            .sum()
    }

    fn on_option_quote(&mut self, quote: &OptionQuote) {
        let chain = self
            .chains
            .entry(quote.underlying.clone())
            .or_insert_with(|| OptionChain::new(&quote.underlying, &quote.expiration));
        chain.absorb(quote);
        debug!(
            underlying = %quote.underlying,
            strike = quote.strike,
            iv = quote.implied_vol,
            "option chain updated"
        );
    }
}
