//! Market-data types and the collaborator-facing surface: feed record
//! parsing, egress line formatting, and the fetch rate limiter.

pub mod feed;
pub mod rate_limit;

pub use feed::{parse_line, FeedMessage, IndicatorRecord};
pub use rate_limit::RateLimiter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("invalid feed record: {0}")]
    InvalidFormat(String),
    #[error("rate limited, retry in {retry_in_secs}s")]
    RateLimited { retry_in_secs: u64 },
    #[error("transient collaborator failure: {0}")]
    Transient(String),
}

/// A point-in-time market observation for one symbol. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
    pub high: f64,
    pub low: f64,
    pub change_pct: f64,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

impl Tick {
    pub fn new(symbol: &str, price: f64, volume: f64, timestamp: u64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            volume,
            bid: price,
            ask: price,
            high: price,
            low: price,
            change_pct: 0.0,
            timestamp,
        }
    }

    pub fn with_quotes(mut self, bid: f64, ask: f64) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    pub fn with_range(mut self, high: f64, low: f64) -> Self {
        self.high = high;
        self.low = low;
        self
    }
}

/// A single option quote from the options feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub underlying: String,
    pub strike: f64,
    pub expiration: String,
    pub is_call: bool,
    pub price: f64,
    pub implied_vol: f64,
    pub delta: f64,
}

/// Per-underlying listed option chain, accumulated from option quotes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    pub expiration: String,
    pub strikes: Vec<f64>,
    /// Implied vol per strike, in strike order.
    pub implied_vols: Vec<f64>,
}

impl OptionChain {
    pub fn new(underlying: &str, expiration: &str) -> Self {
        Self {
            underlying: underlying.to_string(),
            expiration: expiration.to_string(),
            ..Self::default()
        }
    }

    /// Record a quote's strike and IV, keeping strikes sorted and unique.
    pub fn absorb(&mut self, quote: &OptionQuote) {
        match self
            .strikes
            .iter()
            .position(|s| (*s - quote.strike).abs() < f64::EPSILON)
        {
            Some(i) => self.implied_vols[i] = quote.implied_vol,
            None => {
                let insert_at = self
                    .strikes
                    .iter()
                    .position(|s| *s > quote.strike)
                    .unwrap_or(self.strikes.len());
                self.strikes.insert(insert_at, quote.strike);
                self.implied_vols.insert(insert_at, quote.implied_vol);
            }
        }
        if self.expiration.is_empty() {
            self.expiration = quote.expiration.clone();
        }
    }

    /// Mean implied volatility over the chain, if any quotes were absorbed.
    pub fn mean_implied_vol(&self) -> Option<f64> {
        if self.implied_vols.is_empty() {
            return None;
        }
        Some(self.implied_vols.iter().sum::<f64>() / self.implied_vols.len() as f64)
    }

    /// Listed strike closest to the given spot.
    pub fn atm_strike(&self, spot: f64) -> Option<f64> {
        self.strikes
            .iter()
            .copied()
            .min_by(|a, b| (a - spot).abs().total_cmp(&(b - spot).abs()))
    }
}
