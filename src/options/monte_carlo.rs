//! Monte-Carlo option pricing over Geometric Brownian Motion.
//!
//! Terminal prices are simulated under the risk-neutral measure with drift
//! r - σ²/2 and diffusion σ; the mean payoff is discounted at the risk-free
//! rate. Paths are independent, so simulation is parallelized with rayon and
//! kept reproducible by deriving a per-path RNG from the base seed.

use super::{black_scholes::OptionParams, OptionsError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Monte-Carlo simulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloParams {
    pub option: OptionParams,
    pub num_paths: usize,
    pub num_steps: usize,
}

/// Monte-Carlo pricing output with sampling-error diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub price: f64,
    pub std_error: f64,
    /// 95% confidence interval (z = 1.96).
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Seedable GBM simulator.
#[derive(Debug, Clone)]
pub struct MonteCarloPricer {
    seed: u64,
}

impl MonteCarloPricer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Price an option by simulating discounted terminal payoffs.
    pub fn price(&self, params: &MonteCarloParams) -> Result<SimulationResult, OptionsError> {
        let opt = &params.option;
        if params.num_paths < 2 {
            return Err(OptionsError::InvalidParams(format!(
                "need at least 2 paths, got {}",
                params.num_paths
            )));
        }
        if params.num_steps == 0 {
            return Err(OptionsError::InvalidParams("num_steps must be > 0".into()));
        }
        if opt.volatility <= 0.0 || opt.time_to_expiry < 0.0 {
            return Err(OptionsError::InvalidParams(format!(
                "sigma={} T={} outside domain",
                opt.volatility, opt.time_to_expiry
            )));
        }

        let dt = opt.time_to_expiry / params.num_steps as f64;
        let drift = opt.risk_free_rate - 0.5 * opt.volatility * opt.volatility;
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| OptionsError::InvalidParams(e.to_string()))?;
        let base_seed = self.seed;

        let payoffs: Vec<f64> = (0..params.num_paths)
            .into_par_iter()
            .map(|path| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(path as u64));
                let mut price = opt.spot;
                for _ in 0..params.num_steps {
                    let dw = normal.sample(&mut rng) * dt.sqrt();
                    price *= (drift * dt + opt.volatility * dw).exp();
                }
                payoff(price, opt.strike, opt.is_call)
            })
            .collect();

        let n = payoffs.len() as f64;
        let mean_payoff = payoffs.iter().sum::<f64>() / n;
        let discount = (-opt.risk_free_rate * opt.time_to_expiry).exp();
        let price = mean_payoff * discount;

        let variance = payoffs
            .iter()
            .map(|p| (p - mean_payoff).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std_error = (variance / n).sqrt() * discount;

        let margin = 1.96 * std_error;
        Ok(SimulationResult {
            price,
            std_error,
            ci_low: price - margin,
            ci_high: price + margin,
        })
    }

    /// Simulate a single GBM price path including the starting point.
    pub fn price_path(
        &self,
        spot: f64,
        drift: f64,
        volatility: f64,
        horizon: f64,
        num_steps: usize,
    ) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.path_with_rng(&mut rng, spot, drift, volatility, horizon, num_steps)
    }

    /// Simulate several independent GBM price paths.
    pub fn price_paths(
        &self,
        spot: f64,
        drift: f64,
        volatility: f64,
        horizon: f64,
        num_steps: usize,
        num_paths: usize,
    ) -> Vec<Vec<f64>> {
        (0..num_paths)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                self.path_with_rng(&mut rng, spot, drift, volatility, horizon, num_steps)
            })
            .collect()
    }

    fn path_with_rng(
        &self,
        rng: &mut StdRng,
        spot: f64,
        drift: f64,
        volatility: f64,
        horizon: f64,
        num_steps: usize,
    ) -> Vec<f64> {
        let normal = Normal::new(0.0, 1.0).expect("unit normal");
        let dt = horizon / num_steps as f64;
        let mut path = Vec::with_capacity(num_steps + 1);
        let mut price = spot;
        path.push(price);
        for _ in 0..num_steps {
            let dw = normal.sample(rng) * dt.sqrt();
            price *= ((drift - 0.5 * volatility * volatility) * dt + volatility * dw).exp();
            path.push(price);
        }
        path
    }
}

fn payoff(final_price: f64, strike: f64, is_call: bool) -> f64 {
    if is_call {
        (final_price - strike).max(0.0)
    } else {
        (strike - final_price).max(0.0)
    }
}
