//! Core types shared across the PPSR lookup crates.
//!
//! Defines the HTTP request/response bodies, the per-call correlation id,
//! and the layered service configuration used by the runner and the server.

pub mod config;
pub mod error;
pub mod ids;
pub mod lookup;

pub use config::{
    parse_truthy, BrowserConfig, ConfigLoader, ConfigSource, EffectiveConfig, ServiceConfig,
    DEFAULT_TARGET_URL, ENV_MAPPINGS,
};
pub use error::ConfigError;
pub use ids::CorrelationId;
pub use lookup::{mask_identifier, LookupRequest, LookupResponse, LookupStatus, ValidationError};
