//! Order, trade, and status types for the matching core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderBookError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("order not found: {0}")]
    NotFound(OrderId),
    #[error("order {0} is already terminal")]
    AlreadyTerminal(OrderId),
    #[error("duplicate order id: {0}")]
    DuplicateOrder(OrderId),
    #[error("symbol mismatch: book is {expected}, order is {actual}")]
    SymbolMismatch { expected: String, actual: String },
}

/// Globally unique order identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OrderId(pub u64);

impl OrderId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses freeze the order.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A resting or incoming order.
///
/// `sequence` is assigned by the book at admission and is the definitive
/// price-time tie-break; the submission timestamp is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price. Ignored for market orders.
    pub price: f64,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub status: OrderStatus,
    /// Submission time, epoch milliseconds.
    pub timestamp: u64,
    pub client_id: String,
    /// Admission sequence number, assigned by the book.
    pub sequence: u64,
}

impl Order {
    pub fn limit(
        id: impl Into<OrderId>,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            quantity,
            filled_quantity: 0.0,
            status: OrderStatus::Pending,
            timestamp,
            client_id: String::new(),
            sequence: 0,
        }
    }

    pub fn market(
        id: impl Into<OrderId>,
        symbol: &str,
        side: Side,
        quantity: f64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            price: 0.0,
            quantity,
            filled_quantity: 0.0,
            status: OrderStatus::Pending,
            timestamp,
            client_id: String::new(),
            sequence: 0,
        }
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn remaining(&self) -> f64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Price used for queue ordering and crossing. Market orders behave as a
    /// limit at the side-extreme price.
    pub fn effective_price(&self) -> f64 {
        if self.order_type == OrderType::Market {
            match self.side {
                Side::Buy => f64::INFINITY,
                Side::Sell => 0.0,
            }
        } else {
            self.price
        }
    }

    pub fn validate(&self) -> Result<(), OrderBookError> {
        if self.symbol.trim().is_empty() {
            return Err(OrderBookError::InvalidOrder("empty symbol".into()));
        }
        if !(self.quantity > 0.0) || !self.quantity.is_finite() {
            return Err(OrderBookError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.order_type != OrderType::Market && (!(self.price > 0.0) || !self.price.is_finite())
        {
            return Err(OrderBookError::InvalidOrder(format!(
                "limit price must be positive, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// An executed match between two orders. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_orders_price_at_side_extreme() {
        let buy = Order::market(1, "AAPL", Side::Buy, 10.0, 0);
        let sell = Order::market(2, "AAPL", Side::Sell, 10.0, 0);
        assert_eq!(buy.effective_price(), f64::INFINITY);
        assert_eq!(sell.effective_price(), 0.0);
    }

    #[test]
    fn validation_rejects_degenerate_orders() {
        assert!(Order::limit(1, "", Side::Buy, 10.0, 1.0, 0).validate().is_err());
        assert!(Order::limit(1, "AAPL", Side::Buy, 0.0, 1.0, 0)
            .validate()
            .is_err());
        assert!(Order::limit(1, "AAPL", Side::Buy, 10.0, 0.0, 0)
            .validate()
            .is_err());
        assert!(Order::market(1, "AAPL", Side::Sell, 5.0, 0).validate().is_ok());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::PartialFilled.is_terminal());
    }
}
