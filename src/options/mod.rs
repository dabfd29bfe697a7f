//! Options analytics.
//!
//! Closed-form Black-Scholes pricing, Greeks, and implied-volatility
//! inversion, plus a Monte-Carlo pricer over Geometric Brownian Motion.
//! All computation is IEEE-754 double precision.

pub mod black_scholes;
pub mod monte_carlo;

pub use black_scholes::{
    bs_price, greeks, implied_volatility, Greeks, OptionParams, IV_MAX_ITERATIONS, IV_TOLERANCE,
};
pub use monte_carlo::{MonteCarloParams, MonteCarloPricer, SimulationResult};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptionsError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("price not invertible: {0}")]
    NotInvertible(String),
}
