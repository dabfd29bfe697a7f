//! Shared numeric and clock helpers used across the cores.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch milliseconds. All timestamps in the crate are based on this clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Fixed-size FIFO window over a stream of observations.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    window: VecDeque<f64>,
    size: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(size),
            size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.window.len() == self.size {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        self.window.push_back(value);
        self.sum += value;
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.size
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Mean of the window contents; `None` until the window is full.
    pub fn mean(&self) -> Option<f64> {
        if self.is_full() {
            Some(self.sum / self.size as f64)
        } else {
            None
        }
    }

    /// Population standard deviation of the window; `None` until full.
    pub fn std_dev(&self) -> Option<f64> {
        let m = self.mean()?;
        let variance =
            self.window.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / self.size as f64;
        Some(variance.sqrt())
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.window.iter()
    }
}
