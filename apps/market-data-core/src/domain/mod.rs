//! Domain layer - Core state machines with no I/O.

/// Price alert evaluation.
pub mod alert;
/// Notification ledger and delivery preferences.
pub mod notification;
/// Per-symbol quote state merged from primary and fallback sources.
pub mod quote;
/// Channel routing table for subscriber fan-out.
pub mod routing;
