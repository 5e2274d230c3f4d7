//! Application Services

/// Price aggregation and alert evaluation.
pub mod aggregator;
/// Upstream stream fan-out.
pub mod multiplexer;

pub use aggregator::PriceAggregator;
pub use multiplexer::{StreamMultiplexer, SubscriptionHandle};
