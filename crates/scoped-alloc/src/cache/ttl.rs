//! Adaptive per-size-class TTL
//!
//! Each size class keeps a fixed-length sliding window of reuse outcomes
//! (hit or miss). Once the window is full every new observation retunes the
//! TTL: a window without misses decays it by one step, otherwise it grows
//! in proportion to the misses seen, by at most `max(2 * ttl, step)` per
//! adjustment and never beyond the configured maximum.

use std::collections::VecDeque;
use std::time::Duration;

/// Sliding-window TTL controller for one size class
#[derive(Debug, Clone)]
pub(crate) struct AdaptiveTtl {
    ttl: Duration,
    window: VecDeque<bool>,
    window_len: usize,
    misses: usize,
}

impl AdaptiveTtl {
    pub(crate) fn new(ttl: Duration, window_len: usize) -> Self {
        Self {
            ttl,
            window: VecDeque::with_capacity(window_len),
            window_len,
            misses: 0,
        }
    }

    #[inline]
    pub(crate) fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Misses currently in the window
    #[cfg(test)]
    pub(crate) fn misses(&self) -> usize {
        self.misses
    }

    /// Records one reuse outcome and retunes the TTL once the window is full
    pub(crate) fn observe(&mut self, miss: bool, step: Duration, max_ttl: Duration) {
        if self.window.len() == self.window_len
            && let Some(evicted) = self.window.pop_front()
            && evicted
        {
            self.misses -= 1;
        }

        self.window.push_back(miss);
        if miss {
            self.misses += 1;
        }

        if self.window.len() < self.window_len {
            return;
        }

        if self.misses == 0 {
            self.ttl = self.ttl.saturating_sub(step);
        } else {
            let wanted = step.saturating_mul(u32::try_from(self.misses).unwrap_or(u32::MAX));
            let bound = self.ttl.saturating_mul(2).max(step);
            self.ttl = self.ttl.saturating_add(wanted.min(bound)).min(max_ttl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(10);
    const MAX: Duration = Duration::from_secs(1);

    #[test]
    fn test_no_change_until_window_full() {
        let mut ttl = AdaptiveTtl::new(Duration::from_millis(100), 4);
        for _ in 0..3 {
            ttl.observe(false, STEP, MAX);
        }
        assert_eq!(ttl.ttl(), Duration::from_millis(100));

        ttl.observe(false, STEP, MAX);
        assert_eq!(ttl.ttl(), Duration::from_millis(90));
    }

    #[test]
    fn test_pure_hits_decay_to_zero() {
        let mut ttl = AdaptiveTtl::new(Duration::from_millis(30), 2);
        let mut seen = Vec::new();
        for _ in 0..8 {
            ttl.observe(false, STEP, MAX);
            seen.push(ttl.ttl());
        }
        assert!(seen.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(ttl.ttl(), Duration::ZERO);
    }

    #[test]
    fn test_misses_grow_proportionally() {
        let mut ttl = AdaptiveTtl::new(Duration::from_millis(100), 4);
        for miss in [true, false, false, false] {
            ttl.observe(miss, STEP, MAX);
        }
        // one miss in the window: +1 step
        assert_eq!(ttl.ttl(), Duration::from_millis(110));
        assert_eq!(ttl.misses(), 1);

        ttl.observe(true, STEP, MAX);
        // the first miss slid out, the new one came in
        assert_eq!(ttl.misses(), 1);
        assert_eq!(ttl.ttl(), Duration::from_millis(120));
    }

    #[test]
    fn test_growth_is_bounded() {
        let mut ttl = AdaptiveTtl::new(Duration::ZERO, 4);
        for _ in 0..4 {
            ttl.observe(true, STEP, MAX);
        }
        // from zero the bound is one step
        assert_eq!(ttl.ttl(), STEP);

        let mut ttl = AdaptiveTtl::new(Duration::from_millis(900), 1);
        ttl.observe(true, Duration::from_millis(500), MAX);
        assert_eq!(ttl.ttl(), MAX);
    }
}
