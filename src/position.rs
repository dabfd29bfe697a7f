//! Portfolio positions.
//!
//! Positions aggregate by (symbol, strike, expiration, is_call) for options
//! and by symbol alone for everything else. Quantity is signed: long > 0,
//! short < 0.

use crate::options::Greeks;
use serde::{Deserialize, Serialize};

/// Option-specific position fields, including per-contract Greeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionPosition {
    pub strike: f64,
    pub expiration: String,
    pub is_call: bool,
    pub greeks: Greeks,
}

/// Aggregation key for a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: String,
    /// (strike bits, expiration, is_call) for options, None for stock.
    pub option: Option<(u64, String, bool)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed quantity: long > 0, short < 0.
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    /// Epoch milliseconds of the opening fill.
    pub entry_time: u64,
    pub option: Option<OptionPosition>,
}

impl Position {
    pub fn stock(symbol: &str, quantity: f64, price: f64, entry_time: u64) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            average_price: price,
            current_price: price,
            unrealized_pnl: 0.0,
            entry_time,
            option: None,
        }
    }

    pub fn option(
        symbol: &str,
        quantity: f64,
        price: f64,
        entry_time: u64,
        option: OptionPosition,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            average_price: price,
            current_price: price,
            unrealized_pnl: 0.0,
            entry_time,
            option: Some(option),
        }
    }

    pub fn is_option(&self) -> bool {
        self.option.is_some()
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            symbol: self.symbol.clone(),
            option: self
                .option
                .as_ref()
                .map(|o| (o.strike.to_bits(), o.expiration.clone(), o.is_call)),
        }
    }

    /// Signed market value at the current price.
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    /// Absolute exposure at the current price.
    pub fn exposure(&self) -> f64 {
        self.market_value().abs()
    }

    /// Update the mark and the unrealized P&L.
    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.average_price) * self.quantity;
    }

    /// Apply a signed fill. Same-direction fills average into the entry
    /// price; opposing fills realize P&L against it and, on a flip through
    /// zero, restart the position at the fill price. Returns realized P&L.
    pub fn apply_fill(&mut self, fill_quantity: f64, price: f64) -> f64 {
        if fill_quantity == 0.0 {
            return 0.0;
        }

        let same_direction = self.quantity == 0.0 || self.quantity.signum() == fill_quantity.signum();
        if same_direction {
            let total = self.quantity + fill_quantity;
            self.average_price = (self.average_price * self.quantity + price * fill_quantity)
                / total;
            self.quantity = total;
            self.mark(price);
            return 0.0;
        }

        let closed = fill_quantity.abs().min(self.quantity.abs());
        let realized = (price - self.average_price) * closed * self.quantity.signum();
        let remainder = self.quantity + fill_quantity;

        if remainder == 0.0 {
            self.quantity = 0.0;
        } else if remainder.signum() != self.quantity.signum() {
            // Flipped through zero: the surviving exposure opened at this fill.
            self.quantity = remainder;
            self.average_price = price;
        } else {
            self.quantity = remainder;
        }
        self.mark(price);
        realized
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < 1e-12
    }
}
