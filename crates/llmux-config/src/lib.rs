//! Gateway configuration: defaults, deep-merge file loading, and
//! environment overrides (ambient stack, §10.3).
//!
//! Grounded on the hand-rolled deep-merge loader used for settings
//! elsewhere in this workspace, not on a schema-builder crate: that loader
//! never actually reaches for one either. See `DESIGN.md` for the note on
//! this choice.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{ConfigError, Result};
pub use loader::{config_path, load_config, load_config_from_path};
pub use types::{AmpConfig, CooldownConfig, CorsConfig, GatewayConfig, RetryConfig, RoutingConfig, ServerConfig};
