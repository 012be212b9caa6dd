//! Worker execution environment boundary.
//!
//! The pool never creates OS threads, processes, or isolates itself; it asks
//! a [`WorkerEnvironment`] to do so and talks to the resulting context only
//! through channels carrying the wire protocol. The default implementation
//! backs each worker with a dedicated OS thread ([`ThreadEnvironment`]), but
//! subprocess or sandbox environments fit behind the same trait.

mod thread;

pub use thread::ThreadEnvironment;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{CallRequest, WorkerEvent, WorkerId};

/// Error type for worker spawning.
#[derive(Debug, Clone)]
pub struct SpawnError {
    pub message: String,
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SpawnError {}

impl From<String> for SpawnError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for SpawnError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Channel half handed back by a successful spawn.
///
/// Dropping `requests` orders the context to stop once its in-flight call
/// (if any) finishes; there is no way to interrupt a call mid-execution.
pub struct SpawnedWorker {
    /// Call requests flow to the worker runtime stub through here.
    pub requests: mpsc::UnboundedSender<CallRequest>,
}

/// Trait for worker execution environments.
///
/// Implementations must deliver, on the provided `events` channel:
/// a one-time [`WorkerEvent::Ready`] once the context accepts requests,
/// a [`WorkerEvent::Response`] per call request, and a
/// [`WorkerEvent::Exited`] when the context dies for any reason
/// (including crashes while a call is in flight).
#[async_trait]
pub trait WorkerEnvironment: Send + Sync + 'static {
    /// Create one isolated execution context.
    ///
    /// A returned error means no context was created; the pool must not
    /// count the attempt toward its size.
    async fn spawn(
        &self,
        worker: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<SpawnedWorker, SpawnError>;
}
