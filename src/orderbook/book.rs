//! Per-symbol limit order book with continuous price-time priority matching.
//!
//! Orders are owned by an id-keyed arena; the per-side queues hold sort keys
//! only, so cancellation is an O(log n) key removal and terminal orders stay
//! queryable in the arena. A single mutex wraps the arena and both queues so
//! they move together atomically; matching runs to quiescence before the lock
//! is released.

use super::types::{Order, OrderBookError, OrderId, OrderStatus, Side, Trade};
use crate::utils::now_millis;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Bid queue key: price descending, then admission sequence ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BidKey {
    price: f64,
    sequence: u64,
}

impl Eq for BidKey {}

impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .price
            .total_cmp(&self.price)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for BidKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ask queue key: price ascending, then admission sequence ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AskKey {
    price: f64,
    sequence: u64,
}

impl Eq for AskKey {}

impl Ord for AskKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.price
            .total_cmp(&other.price)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for AskKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct BookState {
    /// Arena of every order ever admitted, terminal ones included.
    orders: HashMap<OrderId, Order>,
    bids: BTreeMap<BidKey, OrderId>,
    asks: BTreeMap<AskKey, OrderId>,
    next_sequence: u64,
    next_trade_id: u64,
}

/// Price-time priority order book for one symbol.
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    state: Mutex<BookState>,
}

impl OrderBook {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            state: Mutex::new(BookState::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Admit an order and immediately match to quiescence. Returns the trades
    /// produced by the admission.
    pub fn add_order(&self, mut order: Order) -> Result<Vec<Trade>, OrderBookError> {
        order.validate()?;
        if order.symbol != self.symbol {
            return Err(OrderBookError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: order.symbol,
            });
        }

        let mut state = self.state.lock();
        if state.orders.contains_key(&order.id) {
            return Err(OrderBookError::DuplicateOrder(order.id));
        }

        state.next_sequence += 1;
        order.sequence = state.next_sequence;
        order.status = OrderStatus::Pending;
        order.filled_quantity = 0.0;

        let key_price = order.effective_price();
        let id = order.id;
        let sequence = order.sequence;
        match order.side {
            Side::Buy => {
                state.bids.insert(
                    BidKey {
                        price: key_price,
                        sequence,
                    },
                    id,
                );
            }
            Side::Sell => {
                state.asks.insert(
                    AskKey {
                        price: key_price,
                        sequence,
                    },
                    id,
                );
            }
        }
        state.orders.insert(id, order);

        Ok(Self::match_locked(&self.symbol, &mut state))
    }

    /// Cancel a resting order. Unknown ids report `NotFound`; orders that have
    /// already reached a terminal status report `AlreadyTerminal`.
    pub fn cancel_order(&self, id: OrderId) -> Result<(), OrderBookError> {
        let mut state = self.state.lock();
        let (side, price, sequence) = {
            let order = state
                .orders
                .get(&id)
                .ok_or(OrderBookError::NotFound(id))?;
            if order.is_terminal() {
                return Err(OrderBookError::AlreadyTerminal(id));
            }
            (order.side, order.effective_price(), order.sequence)
        };

        match side {
            Side::Buy => {
                state.bids.remove(&BidKey { price, sequence });
            }
            Side::Sell => {
                state.asks.remove(&AskKey { price, sequence });
            }
        }
        if let Some(order) = state.orders.get_mut(&id) {
            order.status = OrderStatus::Cancelled;
        }
        debug!(order_id = %id, "order cancelled");
        Ok(())
    }

    /// Best bid price, if any order rests on the buy side.
    pub fn best_bid(&self) -> Option<f64> {
        let state = self.state.lock();
        state.bids.keys().next().map(|k| k.price)
    }

    /// Best ask price, if any order rests on the sell side.
    pub fn best_ask(&self) -> Option<f64> {
        let state = self.state.lock();
        state.asks.keys().next().map(|k| k.price)
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(0.5 * (bid + ask)),
            _ => None,
        }
    }

    /// Top-n bid levels as (price, remaining quantity), best first.
    pub fn bid_levels(&self, depth: usize) -> Vec<(f64, f64)> {
        let state = self.state.lock();
        let mut levels: Vec<(f64, f64)> = Vec::new();
        for (key, id) in state.bids.iter() {
            let remaining = state.orders.get(id).map(|o| o.remaining()).unwrap_or(0.0);
            match levels.last_mut() {
                Some((price, qty)) if *price == key.price => *qty += remaining,
                _ => {
                    if levels.len() == depth {
                        break;
                    }
                    levels.push((key.price, remaining));
                }
            }
        }
        levels
    }

    /// Top-n ask levels as (price, remaining quantity), best first.
    pub fn ask_levels(&self, depth: usize) -> Vec<(f64, f64)> {
        let state = self.state.lock();
        let mut levels: Vec<(f64, f64)> = Vec::new();
        for (key, id) in state.asks.iter() {
            let remaining = state.orders.get(id).map(|o| o.remaining()).unwrap_or(0.0);
            match levels.last_mut() {
                Some((price, qty)) if *price == key.price => *qty += remaining,
                _ => {
                    if levels.len() == depth {
                        break;
                    }
                    levels.push((key.price, remaining));
                }
            }
        }
        levels
    }

    /// Snapshot of an order by id, terminal orders included.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.lock().orders.get(&id).cloned()
    }

    /// Number of open (non-terminal) orders resting in the book.
    pub fn open_orders(&self) -> usize {
        let state = self.state.lock();
        state.bids.len() + state.asks.len()
    }

    /// Match crossed orders until the book is quiescent. The caller holds the
    /// book lock for the whole run, so a crossed book is never observable.
    fn match_locked(symbol: &str, state: &mut BookState) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let (bid_key, buy_id) = match state.bids.iter().next() {
                Some((k, id)) => (*k, *id),
                None => break,
            };
            let (ask_key, sell_id) = match state.asks.iter().next() {
                Some((k, id)) => (*k, *id),
                None => break,
            };
            if bid_key.price < ask_key.price {
                break;
            }

            // The resting order is the earlier admission; execution happens at
            // its price, giving the aggressor the price improvement. A resting
            // market order has no price of its own, so the other side's limit
            // prices the trade instead.
            let resting_is_buy = bid_key.sequence < ask_key.sequence;
            let resting_price = if resting_is_buy {
                bid_key.price
            } else {
                ask_key.price
            };
            let exec_price = if resting_price.is_finite() && resting_price > 0.0 {
                resting_price
            } else if resting_is_buy {
                ask_key.price
            } else {
                bid_key.price
            };
            if !exec_price.is_finite() || exec_price <= 0.0 {
                // Two opposing market orders cannot establish a price.
                break;
            }

            let buy_remaining = state.orders[&buy_id].remaining();
            let sell_remaining = state.orders[&sell_id].remaining();
            let quantity = buy_remaining.min(sell_remaining);

            for id in [buy_id, sell_id] {
                let order = state.orders.get_mut(&id).expect("queued order in arena");
                order.filled_quantity += quantity;
                order.status = if order.remaining() <= 0.0 {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartialFilled
                };
            }

            if state.orders[&buy_id].status == OrderStatus::Filled {
                state.bids.remove(&bid_key);
            }
            if state.orders[&sell_id].status == OrderStatus::Filled {
                state.asks.remove(&ask_key);
            }

            state.next_trade_id += 1;
            let trade = Trade {
                id: state.next_trade_id,
                symbol: symbol.to_string(),
                buy_order_id: buy_id,
                sell_order_id: sell_id,
                price: exec_price,
                quantity,
                timestamp: now_millis(),
            };
            debug!(
                trade_id = trade.id,
                price = trade.price,
                quantity = trade.quantity,
                "trade executed"
            );
            trades.push(trade);
        }

        trades
    }
}
