//! Price Quote Types
//!
//! Domain state for per-symbol prices merged from two sources: the
//! push-based primary feed and the poll-based fallback.
//!
//! # Precedence
//!
//! - A primary update overwrites the held quote unconditionally
//!   (last-write-wins).
//! - A fallback update only seeds a symbol that has no quote at all; it
//!   never overrides an existing quote of either source. Fallback is
//!   strictly last-resort, first-value-only.
//!
//! A missing price is represented as `None`, never as an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

// =============================================================================
// Types
// =============================================================================

/// Which feed produced a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    /// Push-based low-latency feed.
    Primary,
    /// Poll-based backup feed, used only to fill gaps.
    Fallback,
}

impl QuoteSource {
    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// One held price quote. Last-write-wins per symbol; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Human-readable symbol, e.g. `"APT/USD"`.
    pub symbol: String,
    /// Last observed price.
    pub price: Decimal,
    /// Confidence interval around the price (zero when unknown).
    pub confidence: Decimal,
    /// When the value was observed.
    pub observed_at: DateTime<Utc>,
    /// Which feed produced the value.
    pub source: QuoteSource,
}

// =============================================================================
// Quote Book
// =============================================================================

/// Per-symbol quote table, one quote held per symbol at a time.
///
/// Thread-safe; owned exclusively by the price aggregator. Callers read
/// snapshots or use the accessors — the map itself is never exposed.
pub struct QuoteBook {
    inner: RwLock<HashMap<String, PriceQuote>>,
}

impl Default for QuoteBook {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteBook {
    /// Create an empty quote book.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a primary-source update. Always overwrites.
    pub fn apply_primary(
        &self,
        symbol: &str,
        price: Decimal,
        confidence: Decimal,
        observed_at: DateTime<Utc>,
    ) {
        let quote = PriceQuote {
            symbol: symbol.to_string(),
            price,
            confidence,
            observed_at,
            source: QuoteSource::Primary,
        };
        self.inner.write().insert(symbol.to_string(), quote);
    }

    /// Apply a fallback-source update.
    ///
    /// Only seeds a symbol with no existing quote. Returns `true` when the
    /// value was applied.
    pub fn apply_fallback(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) -> bool {
        let mut book = self.inner.write();

        if book.contains_key(symbol) {
            return false;
        }

        book.insert(
            symbol.to_string(),
            PriceQuote {
                symbol: symbol.to_string(),
                price,
                confidence: Decimal::ZERO,
                observed_at,
                source: QuoteSource::Fallback,
            },
        );
        true
    }

    /// Snapshot of the quote held for `symbol`.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.inner.read().get(symbol).cloned()
    }

    /// Last held price for `symbol`.
    #[must_use]
    pub fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.inner.read().get(symbol).map(|q| q.price)
    }

    /// Confidence of the held quote.
    #[must_use]
    pub fn confidence(&self, symbol: &str) -> Option<Decimal> {
        self.inner.read().get(symbol).map(|q| q.confidence)
    }

    /// Which source produced the held quote.
    #[must_use]
    pub fn source(&self, symbol: &str) -> Option<QuoteSource> {
        self.inner.read().get(symbol).map(|q| q.source)
    }

    /// Age of the held quote in milliseconds, relative to `now`.
    #[must_use]
    pub fn age_ms_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<i64> {
        self.inner
            .read()
            .get(symbol)
            .map(|q| (now - q.observed_at).num_milliseconds())
    }

    /// Age of the held quote in milliseconds.
    #[must_use]
    pub fn age_ms(&self, symbol: &str) -> Option<i64> {
        self.age_ms_at(symbol, Utc::now())
    }

    /// Symbols that currently have no quote of any source.
    ///
    /// The fallback poller fetches exactly these.
    #[must_use]
    pub fn missing_symbols<'a, I>(&self, tracked: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let book = self.inner.read();
        tracked
            .into_iter()
            .filter(|s| !book.contains_key(*s))
            .map(ToString::to_string)
            .collect()
    }

    /// Number of symbols with a held quote.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if no symbol has a quote.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
