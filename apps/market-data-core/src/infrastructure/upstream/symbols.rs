//! Feed Id Lookup Table
//!
//! The upstream feed addresses instruments by opaque hex ids; the fallback
//! source addresses them by asset key. This static table maps both onto
//! the human-readable symbols the rest of the core uses.

/// One row of the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSymbol {
    /// Opaque upstream feed id.
    pub feed_id: &'static str,
    /// Human-readable symbol.
    pub symbol: &'static str,
    /// Asset key used by the fallback HTTP source.
    pub asset_key: &'static str,
}

/// Instruments the core knows how to resolve.
pub const FEED_SYMBOLS: &[FeedSymbol] = &[
    FeedSymbol {
        feed_id: "03ae4db29ed4ae33d323568895aa00337e658e348b37509f5372ae51f0af00d5",
        symbol: "APT/USD",
        asset_key: "aptos",
    },
    FeedSymbol {
        feed_id: "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
        symbol: "BTC/USD",
        asset_key: "bitcoin",
    },
    FeedSymbol {
        feed_id: "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
        symbol: "ETH/USD",
        asset_key: "ethereum",
    },
    FeedSymbol {
        feed_id: "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
        symbol: "SOL/USD",
        asset_key: "solana",
    },
    FeedSymbol {
        feed_id: "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a",
        symbol: "USDC/USD",
        asset_key: "usd-coin",
    },
];

/// Resolve an upstream feed id to its symbol.
#[must_use]
pub fn symbol_for_feed_id(feed_id: &str) -> Option<&'static str> {
    FEED_SYMBOLS
        .iter()
        .find(|s| s.feed_id == feed_id)
        .map(|s| s.symbol)
}

/// Resolve a symbol to its upstream feed id.
#[must_use]
pub fn feed_id_for_symbol(symbol: &str) -> Option<&'static str> {
    FEED_SYMBOLS
        .iter()
        .find(|s| s.symbol == symbol)
        .map(|s| s.feed_id)
}

/// Resolve a symbol to the fallback source's asset key.
#[must_use]
pub fn asset_key_for_symbol(symbol: &str) -> Option<&'static str> {
    FEED_SYMBOLS
        .iter()
        .find(|s| s.symbol == symbol)
        .map(|s| s.asset_key)
}

/// Resolve a fallback asset key back to its symbol.
#[must_use]
pub fn symbol_for_asset_key(asset_key: &str) -> Option<&'static str> {
    FEED_SYMBOLS
        .iter()
        .find(|s| s.asset_key == asset_key)
        .map(|s| s.symbol)
}
