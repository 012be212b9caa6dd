//! Configuration module for taskpool.
//!
//! This module provides centralized configuration loading from environment
//! variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskpool::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Max workers: {}", config.pool.max());
//! ```

mod error;
mod logging;
mod parse;
mod pool;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use pool::PoolConfig;

/// Complete library configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker pool configuration.
    pub pool: PoolConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            pool: PoolConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Min workers: {}", self.pool.min());
        info!("  Max workers: {}", self.pool.max());

        match self.pool.idle() {
            Some(timeout) => info!("  Idle timeout: {:?}", timeout),
            None => info!("  Idle timeout: off"),
        }

        match self.pool.task_quota() {
            Some(quota) => info!("  Tasks per worker: {}", quota),
            None => info!("  Tasks per worker: unlimited"),
        }
    }
}
