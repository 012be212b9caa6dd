//! taskpool - Bounded worker pool for named-method tasks, powered by Tokio.
//!
//! This crate schedules asynchronous tasks onto a bounded set of isolated
//! worker execution contexts. Callers submit calls by method name and get a
//! future back; the pool assigns work FIFO, grows and shrinks the worker set
//! between configured bounds, and turns every failure mode (timeout, crash,
//! cancellation, shutdown) into a rejected future rather than a panic.
//!
//! # Features
//!
//! - **Non-blocking submission**: `submit` returns a task future immediately
//! - **Bounded parallelism**: lazy spawning up to `max_workers`, idle
//!   reclamation down to `min_workers`, optional per-worker task quota
//! - **Failure containment**: timeouts and crashed workers terminate only the
//!   affected worker; the in-flight task is retried once after a crash
//! - **Pluggable execution**: worker contexts are created by a
//!   [`WorkerEnvironment`](env::WorkerEnvironment); threads are built in,
//!   processes or sandboxes fit behind the same trait
//! - **Structured logging**: unified JSON logs via tracing
//!
//! # Example
//!
//! ```rust,ignore
//! use taskpool::config::PoolConfig;
//! use taskpool::pool::Pool;
//! use taskpool::runtime::MethodRegistry;
//! use taskpool::types::SubmitOptions;
//! use serde_json::json;
//!
//! let registry = MethodRegistry::new();
//! registry.register_fn("add", |args| {
//!     let a = args[0].as_i64().ok_or("expected integer")?;
//!     let b = args[1].as_i64().ok_or("expected integer")?;
//!     Ok(json!(a + b))
//! });
//!
//! let pool = Pool::with_registry(PoolConfig::default().max_workers(4), registry);
//! let result = pool.submit("add", vec![json!(2), json!(3)], SubmitOptions::default()).await?;
//! assert_eq!(result, json!(5));
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars), empty outside a checkout
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod env;
pub mod logging;
pub mod pool;
pub mod runtime;
pub mod types;

// Re-exports for convenience
pub use config::{Config, PoolConfig};
pub use pool::{Pool, PoolStatus, TaskError, TaskHandle};
pub use runtime::MethodRegistry;
pub use types::SubmitOptions;
