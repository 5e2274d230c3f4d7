//! Configuration Module
//!
//! Environment-based configuration loading for the market-data core.

mod settings;

pub use settings::{
    ChannelSettings, ConfigError, CoreConfig, FallbackSettings, ServerSettings, UpstreamSettings,
};
