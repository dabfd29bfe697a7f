//! Black-Scholes pricing, Greeks, and implied-volatility inversion.
//!
//! Conventions: theta is returned per calendar day (annualized / 365), vega
//! per one volatility point (mathematical derivative / 100), rho per 1% rate
//! move (/ 100). At expiry the price is the intrinsic value and all Greeks
//! except the indicator delta are zero.

use super::OptionsError;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::f64::consts::PI;

/// Bisection tolerance for implied-volatility search.
pub const IV_TOLERANCE: f64 = 1e-6;
/// Bisection iteration cap for implied-volatility search.
pub const IV_MAX_ITERATIONS: usize = 100;

const IV_VOL_LOW: f64 = 0.01;
const IV_VOL_HIGH: f64 = 5.0;

/// Inputs to the Black-Scholes model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionParams {
    /// Current underlying price.
    pub spot: f64,
    /// Strike price.
    pub strike: f64,
    /// Time to expiration in years.
    pub time_to_expiry: f64,
    /// Annualized risk-free rate (0.05 = 5%).
    pub risk_free_rate: f64,
    /// Annualized volatility (0.20 = 20%).
    pub volatility: f64,
    /// true for a call, false for a put.
    pub is_call: bool,
}

impl OptionParams {
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        risk_free_rate: f64,
        volatility: f64,
        is_call: bool,
    ) -> Self {
        Self {
            spot,
            strike,
            time_to_expiry,
            risk_free_rate,
            volatility,
            is_call,
        }
    }

    pub fn intrinsic(&self) -> f64 {
        if self.is_call {
            (self.spot - self.strike).max(0.0)
        } else {
            (self.strike - self.spot).max(0.0)
        }
    }

    fn validate(&self) -> Result<(), OptionsError> {
        if !(self.spot > 0.0) || !(self.strike > 0.0) {
            return Err(OptionsError::InvalidParams(format!(
                "spot and strike must be positive (spot={}, strike={})",
                self.spot, self.strike
            )));
        }
        if self.time_to_expiry < 0.0 || !self.time_to_expiry.is_finite() {
            return Err(OptionsError::InvalidParams(format!(
                "time to expiry must be non-negative, got {}",
                self.time_to_expiry
            )));
        }
        if self.volatility <= 0.0 || !self.volatility.is_finite() {
            return Err(OptionsError::InvalidParams(format!(
                "volatility must be positive, got {}",
                self.volatility
            )));
        }
        Ok(())
    }

    fn d1(&self) -> f64 {
        let sqrt_t = self.time_to_expiry.sqrt();
        ((self.spot / self.strike).ln()
            + (self.risk_free_rate + 0.5 * self.volatility * self.volatility)
                * self.time_to_expiry)
            / (self.volatility * sqrt_t)
    }

    fn d2(&self) -> f64 {
        self.d1() - self.volatility * self.time_to_expiry.sqrt()
    }
}

/// First-order option sensitivities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// dV/dS.
    pub delta: f64,
    /// d²V/dS².
    pub gamma: f64,
    /// dV/dt, per calendar day.
    pub theta: f64,
    /// dV/dσ, per 1 vol-point.
    pub vega: f64,
    /// dV/dr, per 1% rate move.
    pub rho: f64,
}

/// Standard normal CDF via the complementary error function.
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes premium. Returns the intrinsic value at expiry and maps
/// numerically overflowing inputs to +inf rather than NaN.
pub fn bs_price(params: &OptionParams) -> Result<f64, OptionsError> {
    params.validate()?;

    if params.time_to_expiry <= 0.0 {
        return Ok(params.intrinsic());
    }

    let d1 = params.d1();
    let d2 = params.d2();
    let discount = (-params.risk_free_rate * params.time_to_expiry).exp();

    let price = if params.is_call {
        params.spot * norm_cdf(d1) - params.strike * discount * norm_cdf(d2)
    } else {
        params.strike * discount * norm_cdf(-d2) - params.spot * norm_cdf(-d1)
    };

    if price.is_nan() {
        Ok(f64::INFINITY)
    } else {
        Ok(price)
    }
}

/// All first-order Greeks for the given parameters.
pub fn greeks(params: &OptionParams) -> Result<Greeks, OptionsError> {
    params.validate()?;

    if params.time_to_expiry <= 0.0 {
        let delta = if params.is_call {
            if params.spot > params.strike {
                1.0
            } else {
                0.0
            }
        } else if params.spot < params.strike {
            -1.0
        } else {
            0.0
        };
        return Ok(Greeks {
            delta,
            ..Greeks::default()
        });
    }

    let sqrt_t = params.time_to_expiry.sqrt();
    let d1 = params.d1();
    let d2 = params.d2();
    let nd2 = norm_cdf(d2);
    let n_neg_d2 = norm_cdf(-d2);
    let pdf_d1 = norm_pdf(d1);
    let discount = (-params.risk_free_rate * params.time_to_expiry).exp();

    let delta = if params.is_call {
        norm_cdf(d1)
    } else {
        norm_cdf(d1) - 1.0
    };

    let gamma = pdf_d1 / (params.spot * params.volatility * sqrt_t);

    let theta_common = -(params.spot * pdf_d1 * params.volatility) / (2.0 * sqrt_t);
    let theta_annual = if params.is_call {
        theta_common - params.risk_free_rate * params.strike * discount * nd2
    } else {
        theta_common + params.risk_free_rate * params.strike * discount * n_neg_d2
    };

    let vega = params.spot * pdf_d1 * sqrt_t / 100.0;

    let rho = if params.is_call {
        params.strike * params.time_to_expiry * discount * nd2 / 100.0
    } else {
        -params.strike * params.time_to_expiry * discount * n_neg_d2 / 100.0
    };

    Ok(Greeks {
        delta,
        gamma,
        theta: theta_annual / 365.0,
        vega,
        rho,
    })
}

/// Invert the Black-Scholes price by bisection over σ ∈ [0.01, 5.0].
///
/// The supplied `params.volatility` is ignored. Prices outside the no-arbitrage
/// band (below intrinsic under discounting, or above the spot / discounted
/// strike cap) are rejected with `NotInvertible`. If the search does not
/// converge within the iteration cap the last midpoint is returned.
pub fn implied_volatility(
    market_price: f64,
    params: &OptionParams,
) -> Result<f64, OptionsError> {
    let mut probe = *params;
    probe.volatility = 1.0;
    probe.validate()?;

    if !market_price.is_finite() || market_price < 0.0 {
        return Err(OptionsError::InvalidParams(format!(
            "market price must be a non-negative finite number, got {market_price}"
        )));
    }

    let discount = (-params.risk_free_rate * params.time_to_expiry).exp();
    let (lower_bound, upper_bound) = if params.is_call {
        ((params.spot - params.strike * discount).max(0.0), params.spot)
    } else {
        (
            (params.strike * discount - params.spot).max(0.0),
            params.strike * discount,
        )
    };
    if market_price < lower_bound - IV_TOLERANCE || market_price > upper_bound + IV_TOLERANCE {
        return Err(OptionsError::NotInvertible(format!(
            "price {market_price} outside arbitrage bounds [{lower_bound}, {upper_bound}]"
        )));
    }

    let mut vol_low = IV_VOL_LOW;
    let mut vol_high = IV_VOL_HIGH;
    let mut vol_mid = 0.5 * (vol_low + vol_high);

    for _ in 0..IV_MAX_ITERATIONS {
        probe.volatility = vol_mid;
        let diff = bs_price(&probe)? - market_price;

        if diff.abs() < IV_TOLERANCE {
            return Ok(vol_mid);
        }
        if diff > 0.0 {
            vol_high = vol_mid;
        } else {
            vol_low = vol_mid;
        }
        vol_mid = 0.5 * (vol_low + vol_high);
    }

    Ok(vol_mid)
}
