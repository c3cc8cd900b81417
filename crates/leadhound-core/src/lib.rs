//! Domain types, content sanitization and configuration for leadhound.
//!
//! Everything in this crate is pure: no network or database access. The
//! pipeline crates build on these types.

pub mod app_config;
pub mod config;
pub mod lead;
pub mod noise;
pub mod run;
pub mod sanitize;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use lead::{Intent, NormalizedPost};
pub use noise::{is_denylisted_community, is_sentinel_author, DENYLISTED_COMMUNITIES};
pub use run::{
    LeadTier, Platform, RunConfiguration, RunParameters, RunStatus, TimeWindow,
};
pub use sanitize::{sanitize, Sanitized, MAX_CONTENT_CHARS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown run status: {0}")]
    UnknownStatus(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("unknown lead tier: {0}")]
    UnknownLeadTier(String),

    #[error("unknown time window: {0}")]
    UnknownTimeWindow(String),

    #[error("run configuration must set exactly one of lead tier or time window")]
    AmbiguousConfiguration,
}
