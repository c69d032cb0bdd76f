//! copro-config
//!
//! Persistent user preferences for the condominium accounting tools.
//! Owns the Config data structure plus disk persistence helpers.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::{ConfigManager, HOME_ENV_VAR};
pub use model::Config;
