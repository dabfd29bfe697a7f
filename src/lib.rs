//! Quantitative trading core.
//!
//! Four cooperating cores, composed left to right along the tick path:
//!
//! - [`orderbook`]: price-time priority limit order book with continuous
//!   matching.
//! - [`options`]: Black-Scholes pricing, Greeks, implied volatility, and
//!   Monte-Carlo pricing over Geometric Brownian Motion.
//! - [`strategy`] + [`engine`]: momentum and multi-leg options strategies
//!   scheduled by a single-threaded tick loop that validates and executes
//!   their signals.
//! - [`risk`]: VaR / Expected Shortfall, aggregate Greeks, stress tests, and
//!   risk-limit enforcement over position snapshots.
//!
//! [`marketdata`] and [`indicators`] feed the pipeline; [`backtest`] replays
//! historical bars through the same strategy interface with synthesized
//! fills.

pub mod backtest;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod marketdata;
pub mod options;
pub mod orderbook;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod utils;

pub use config::{Config, ConfigValue, EngineSettings};
pub use engine::{AlgorithmicEngine, EngineError, FeedHandle};
pub use indicators::{IndicatorError, IndicatorFrame, IndicatorSnapshot};
pub use marketdata::{MarketDataError, OptionChain, OptionQuote, RateLimiter, Tick};
pub use options::{
    bs_price, greeks, implied_volatility, Greeks, MonteCarloParams, MonteCarloPricer,
    OptionParams, OptionsError, SimulationResult,
};
pub use orderbook::{Order, OrderBook, OrderBookError, OrderId, OrderStatus, OrderType, Side, Trade};
pub use position::{OptionPosition, Position, PositionKey};
pub use risk::{
    PortfolioGreeks, RiskEngine, RiskEngineConfig, RiskError, RiskLimit, RiskMetrics,
    StressScenario, StressTestResult,
};
pub use strategy::{
    MarketView, MomentumStrategy, OptionLeg, OptionsStrategy, Signal, SignalKind, Strategy,
    StrategyConfig, StrategyError, StrategyType,
};
