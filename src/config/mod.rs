//! # Configuration Management
//!
//! Environment-driven configuration for the operator. Variables are read with a
//! `CERTSYNC_` prefix; a `.env` file in the working directory is loaded first
//! when present.

pub mod settings;

pub use settings::{
    parse_stores, AppConfig, CloudflareConfig, ObservabilityConfig, OperatorConfig, VaultConfig,
};

use crate::errors::Result;

/// Load `.env`, read the environment and validate the result
pub fn load() -> Result<AppConfig> {
    // A missing .env file is normal outside local development
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;
    config.validate()?;
    Ok(config)
}
