//! Application layer - Orchestration services and port traits.

/// Port traits for external collaborators.
pub mod ports;
/// Orchestration services.
pub mod services;
