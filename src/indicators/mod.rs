//! Technical indicators over tick streams.
//!
//! Each indicator keeps the minimal rolling state needed for incremental
//! updates and exposes an explicit warmth gate: reading a value before enough
//! observations have arrived is `WarmupIncomplete`, never a placeholder.

use crate::marketdata::Tick;
use crate::utils::RollingWindow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("{indicator} warming up: {have}/{need} observations")]
    WarmupIncomplete {
        indicator: &'static str,
        have: usize,
        need: usize,
    },
}

fn warming(indicator: &'static str, have: usize, need: usize) -> IndicatorError {
    IndicatorError::WarmupIncomplete {
        indicator,
        have,
        need,
    }
}

/// Simple moving average over the last `period` closes.
#[derive(Debug, Clone)]
pub struct Sma {
    window: RollingWindow,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, price: f64) {
        self.window.push(price);
    }

    pub fn value(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}

/// Exponential moving average, seeded with the first observation.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    current: Option<f64>,
    count: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            current: None,
            count: 0,
        }
    }

    pub fn update(&mut self, price: f64) {
        self.current = Some(match self.current {
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
            None => price,
        });
        self.count += 1;
    }

    /// Smoothed value once `period` observations have arrived.
    pub fn value(&self) -> Option<f64> {
        if self.count >= self.period {
            self.current
        } else {
            None
        }
    }

    /// Seeded value regardless of warmth; used when composing indicators.
    pub fn raw(&self) -> Option<f64> {
        self.current
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }
}

/// RSI with Wilder smoothing. The first `period` close-to-close changes seed
/// the averages with simple means; later changes update them as
/// avg' = (avg * (p - 1) + current) / p.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    gain_sum: f64,
    loss_sum: f64,
    changes: usize,
    averages: Option<(f64, f64)>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            gain_sum: 0.0,
            loss_sum: 0.0,
            changes: 0,
            averages: None,
        }
    }

    pub fn update(&mut self, close: f64) {
        if let Some(prev) = self.prev_close {
            let change = close - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            match self.averages {
                Some((avg_gain, avg_loss)) => {
                    let p = self.period as f64;
                    self.averages =
                        Some(((avg_gain * (p - 1.0) + gain) / p, (avg_loss * (p - 1.0) + loss) / p));
                }
                None => {
                    self.gain_sum += gain;
                    self.loss_sum += loss;
                    self.changes += 1;
                    if self.changes == self.period {
                        let p = self.period as f64;
                        self.averages = Some((self.gain_sum / p, self.loss_sum / p));
                    }
                }
            }
        }
        self.prev_close = Some(close);
    }

    pub fn value(&self) -> Option<f64> {
        let (avg_gain, avg_loss) = self.averages?;
        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    pub fn is_ready(&self) -> bool {
        self.averages.is_some()
    }
}

/// Bollinger bands: SMA(period) ± k standard deviations.
#[derive(Debug, Clone)]
pub struct Bollinger {
    window: RollingWindow,
    k: f64,
}

impl Bollinger {
    pub fn new(period: usize, k: f64) -> Self {
        Self {
            window: RollingWindow::new(period),
            k,
        }
    }

    pub fn update(&mut self, price: f64) {
        self.window.push(price);
    }

    /// (upper, lower) once the window is full.
    pub fn bands(&self) -> Option<(f64, f64)> {
        let mid = self.window.mean()?;
        let sd = self.window.std_dev()?;
        Some((mid + self.k * sd, mid - self.k * sd))
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}

/// MACD(fast, slow) with an EMA signal line over the MACD series.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    pub fn update(&mut self, price: f64) {
        self.fast.update(price);
        self.slow.update(price);
        // The MACD line only becomes meaningful once the slow leg is warm;
        // the signal EMA starts accumulating from that point.
        if self.slow.is_ready() {
            if let (Some(fast), Some(slow)) = (self.fast.raw(), self.slow.raw()) {
                self.signal.update(fast - slow);
            }
        }
    }

    /// (macd, signal) once both legs and the signal line are warm.
    pub fn value(&self) -> Option<(f64, f64)> {
        if !self.slow.is_ready() {
            return None;
        }
        let macd = self.fast.raw()? - self.slow.raw()?;
        Some((macd, self.signal.value()?))
    }

    pub fn macd_line(&self) -> Option<f64> {
        if self.slow.is_ready() {
            Some(self.fast.raw()? - self.slow.raw()?)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slow.is_ready() && self.signal.is_ready()
    }
}

/// Average True Range with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    tr_sum: f64,
    tr_count: usize,
    average: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            tr_sum: 0.0,
            tr_count: 0,
            average: None,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) {
        let true_range = match self.prev_close {
            Some(prev) => (high - low)
                .max((high - prev).abs())
                .max((low - prev).abs()),
            None => high - low,
        };

        match self.average {
            Some(avg) => {
                let p = self.period as f64;
                self.average = Some((avg * (p - 1.0) + true_range) / p);
            }
            None => {
                self.tr_sum += true_range;
                self.tr_count += 1;
                if self.tr_count == self.period {
                    self.average = Some(self.tr_sum / self.period as f64);
                }
            }
        }
        self.prev_close = Some(close);
    }

    pub fn value(&self) -> Option<f64> {
        self.average
    }

    pub fn is_ready(&self) -> bool {
        self.average.is_some()
    }
}

/// Volume-weighted average price from session start.
#[derive(Debug, Clone, Default)]
pub struct Vwap {
    cumulative_pv: f64,
    cumulative_volume: f64,
}

impl Vwap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, price: f64, volume: f64) {
        self.cumulative_pv += price * volume;
        self.cumulative_volume += volume;
    }

    pub fn value(&self) -> Option<f64> {
        if self.cumulative_volume > 0.0 {
            Some(self.cumulative_pv / self.cumulative_volume)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cumulative_volume > 0.0
    }
}

/// A warm indicator snapshot, taken once every member is ready.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub sma_20: f64,
    pub sma_50: f64,
    pub rsi: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub atr: f64,
    pub vwap: f64,
}

/// Per-symbol derived state, updated once per accepted tick.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    symbol: String,
    sma_20: Sma,
    sma_50: Sma,
    rsi_14: Rsi,
    bollinger: Bollinger,
    macd: Macd,
    atr_14: Atr,
    vwap: Vwap,
    samples: usize,
}

impl IndicatorFrame {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            sma_20: Sma::new(20),
            sma_50: Sma::new(50),
            rsi_14: Rsi::new(14),
            bollinger: Bollinger::new(20, 2.0),
            macd: Macd::new(12, 26, 9),
            atr_14: Atr::new(14),
            vwap: Vwap::new(),
            samples: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn update(&mut self, tick: &Tick) {
        self.sma_20.update(tick.price);
        self.sma_50.update(tick.price);
        self.rsi_14.update(tick.price);
        self.bollinger.update(tick.price);
        self.macd.update(tick.price);
        self.atr_14.update(tick.high, tick.low, tick.price);
        self.vwap.update(tick.price, tick.volume);
        self.samples += 1;
    }

    pub fn sma_20(&self) -> Result<f64, IndicatorError> {
        self.sma_20
            .value()
            .ok_or_else(|| warming("SMA(20)", self.samples, 20))
    }

    pub fn sma_50(&self) -> Result<f64, IndicatorError> {
        self.sma_50
            .value()
            .ok_or_else(|| warming("SMA(50)", self.samples, 50))
    }

    pub fn rsi(&self) -> Result<f64, IndicatorError> {
        self.rsi_14
            .value()
            .ok_or_else(|| warming("RSI(14)", self.samples, 15))
    }

    pub fn bollinger_bands(&self) -> Result<(f64, f64), IndicatorError> {
        self.bollinger
            .bands()
            .ok_or_else(|| warming("Bollinger(20,2)", self.samples, 20))
    }

    pub fn macd(&self) -> Result<(f64, f64), IndicatorError> {
        self.macd
            .value()
            .ok_or_else(|| warming("MACD(12,26,9)", self.samples, 34))
    }

    pub fn atr(&self) -> Result<f64, IndicatorError> {
        self.atr_14
            .value()
            .ok_or_else(|| warming("ATR(14)", self.samples, 14))
    }

    pub fn vwap(&self) -> Result<f64, IndicatorError> {
        self.vwap
            .value()
            .ok_or_else(|| warming("VWAP", self.samples, 1))
    }

    /// Full snapshot once every indicator is warm.
    pub fn snapshot(&self) -> Result<IndicatorSnapshot, IndicatorError> {
        let (bollinger_upper, bollinger_lower) = self.bollinger_bands()?;
        let (macd, macd_signal) = self.macd()?;
        Ok(IndicatorSnapshot {
            sma_20: self.sma_20()?,
            sma_50: self.sma_50()?,
            rsi: self.rsi()?,
            bollinger_upper,
            bollinger_lower,
            macd,
            macd_signal,
            atr: self.atr()?,
            vwap: self.vwap()?,
        })
    }
}
