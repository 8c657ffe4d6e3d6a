// Copyright (c) James Kassemi, SC, US. All rights reserved.
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry with jittered exponential backoff for transport calls.
///
/// The policy is pure state; the only side effect of [`RetryPolicy::run`] is
/// the sleep between attempts. Errors surface to the caller once the attempt
/// budget is spent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base,
            max_delay_ms: max_delay_ms.max(base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Budget applied to exchange page fetches.
    pub fn default_fetch() -> Self {
        Self::new(3, 500, 4_000, 0.25)
    }

    fn delay_for(&self, completed_attempts: usize) -> Duration {
        let doubled = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(completed_attempts.saturating_sub(1) as u32));
        let capped = doubled.min(self.max_delay_ms);
        if self.jitter_pct == 0.0 {
            return Duration::from_millis(capped);
        }
        let spread = (capped as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(capped.saturating_add_signed(delta))
    }

    /// Runs `op` until it succeeds or `max_attempts` calls have failed,
    /// returning the last error. The closure receives the zero-based attempt
    /// number.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    sleep(self.delay_for(attempt)).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_fetch()
    }
}
