//! Progress aggregation for multi-file extraction.
//!
//! Each extraction subtask publishes a [`ProgressToken`] with a processed
//! count and (once known) a total count; an [`Aggregator`] sums every token
//! it holds into a single `progress ∈ [0,1]`. Tokens are explicit objects
//! rather than callbacks so a caller can hold onto one, update it as work
//! completes, and let the aggregator pull a consistent snapshot at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One subtask's progress counters. Cheap to clone (an `Arc` around two
/// atomics) so the same token can be held by the producer and the consumer.
#[derive(Debug, Clone, Default)]
pub struct ProgressToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    processed: AtomicU64,
    /// `u64::MAX` means "total not yet known" (indeterminate).
    total: AtomicU64,
}

const UNKNOWN_TOTAL: u64 = u64::MAX;

impl ProgressToken {
    pub fn new() -> Self {
        let token = Self::default();
        token.inner.total.store(UNKNOWN_TOTAL, Ordering::Relaxed);
        token
    }

    /// Create a token whose total is already known.
    pub fn with_total(total: u64) -> Self {
        let token = Self::new();
        token.set_total(total);
        token
    }

    pub fn set_total(&self, total: u64) {
        self.inner.total.store(total, Ordering::Relaxed);
    }

    pub fn advance(&self, count: u64) {
        self.inner.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// `None` if the total hasn't been set yet.
    pub fn total(&self) -> Option<u64> {
        match self.inner.total.load(Ordering::Relaxed) {
            UNKNOWN_TOTAL => None,
            n => Some(n),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.total(), Some(total) if self.processed() >= total)
    }
}

/// Aggregates any number of [`ProgressToken`]s into one normalized fraction.
#[derive(Debug, Default)]
pub struct Aggregator {
    tokens: Vec<ProgressToken>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: ProgressToken) {
        self.tokens.push(token);
    }

    /// `true` only when every registered token is still missing a total.
    pub fn is_indeterminate(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| t.total().is_none())
    }

    /// Overall `processed / total` across every registered token, in
    /// `[0, 1]`. `0.0` with no tokens registered or all totals unknown.
    pub fn progress(&self) -> f64 {
        let processed: u64 = self.tokens.iter().map(ProgressToken::processed).sum();
        let total: u64 = self.tokens.iter().filter_map(ProgressToken::total).sum();
        if total == 0 {
            0.0
        } else {
            (processed as f64 / total as f64).min(1.0)
        }
    }

    /// `true` once every registered token with a known total has completed,
    /// and at least one token is registered.
    pub fn is_completed(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(ProgressToken::is_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_indeterminate() {
        let token = ProgressToken::new();
        let mut agg = Aggregator::new();
        agg.register(token);
        assert!(agg.is_indeterminate());
        assert_eq!(agg.progress(), 0.0);
    }

    #[test]
    fn aggregates_multiple_tokens() {
        let a = ProgressToken::with_total(10);
        let b = ProgressToken::with_total(10);
        a.advance(5);
        b.advance(10);

        let mut agg = Aggregator::new();
        agg.register(a);
        agg.register(b);

        assert!(!agg.is_indeterminate());
        assert_eq!(agg.progress(), 0.75);
        assert!(!agg.is_completed());
    }

    #[test]
    fn completes_once_every_token_reaches_its_total() {
        let a = ProgressToken::with_total(3);
        a.advance(3);
        let mut agg = Aggregator::new();
        agg.register(a);
        assert_eq!(agg.progress(), 1.0);
        assert!(agg.is_completed());
    }
}
