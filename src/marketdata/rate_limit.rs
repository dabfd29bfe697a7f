//! Sliding-window rate limiter for the market-data fetcher.
//!
//! Allows at most `max_calls` within any `window`. Call timestamps live in a
//! deque; stale entries are purged on every query. The state sits behind its
//! own lock so the limiter can be shared across producer threads.

use super::MarketDataError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Whether a call may be made right now.
    pub fn can_make_call(&self) -> bool {
        let mut calls = self.calls.lock();
        Self::purge(&mut calls, self.window);
        calls.len() < self.max_calls
    }

    /// Record a call that was just made.
    pub fn record_call(&self) {
        self.calls.lock().push_back(Instant::now());
    }

    /// Check and record in one locked step; refusal carries the retry delay.
    pub fn acquire(&self) -> Result<(), MarketDataError> {
        let mut calls = self.calls.lock();
        Self::purge(&mut calls, self.window);
        if calls.len() < self.max_calls {
            calls.push_back(Instant::now());
            Ok(())
        } else {
            let retry_in_secs = Self::until_reset(&calls, self.window).as_secs();
            Err(MarketDataError::RateLimited { retry_in_secs })
        }
    }

    pub fn calls_remaining(&self) -> usize {
        let mut calls = self.calls.lock();
        Self::purge(&mut calls, self.window);
        self.max_calls.saturating_sub(calls.len())
    }

    /// Seconds until the oldest recorded call ages out of the window.
    pub fn seconds_until_reset(&self) -> u64 {
        let mut calls = self.calls.lock();
        Self::purge(&mut calls, self.window);
        Self::until_reset(&calls, self.window).as_secs()
    }

    fn purge(calls: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn until_reset(calls: &VecDeque<Instant>, window: Duration) -> Duration {
        match calls.front() {
            Some(oldest) => window.saturating_sub(oldest.elapsed()),
            None => Duration::ZERO,
        }
    }
}
