//! Thread-backed worker execution environment.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{SpawnError, SpawnedWorker, WorkerEnvironment};
use crate::runtime::{MethodRegistry, WorkerRuntime};
use crate::types::{WorkerEvent, WorkerId};

/// Backs each worker with a dedicated OS thread running a [`WorkerRuntime`].
///
/// Every spawned worker serves the same shared [`MethodRegistry`]; methods
/// registered after spawning become visible to already-running workers.
///
/// Threads cannot be preempted, so forced termination detaches the worker:
/// the pool drops its request channel and ignores its events from then on,
/// and the thread exits once its current call returns. A crashed callable
/// (panic) unwinds the thread, which the exit guard reports as a crash.
pub struct ThreadEnvironment {
    registry: MethodRegistry,
    name_prefix: String,
}

impl ThreadEnvironment {
    pub fn new(registry: MethodRegistry) -> Self {
        Self::named(registry, "taskpool-worker")
    }

    /// Environment with a custom thread-name prefix.
    pub fn named(registry: MethodRegistry, name_prefix: impl Into<String>) -> Self {
        Self {
            registry,
            name_prefix: name_prefix.into(),
        }
    }
}

#[async_trait]
impl WorkerEnvironment for ThreadEnvironment {
    async fn spawn(
        &self,
        worker: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<SpawnedWorker, SpawnError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let runtime = WorkerRuntime::new(self.registry.clone());
        let thread_name = format!("{}-{}", self.name_prefix, worker);

        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _guard = ExitGuard {
                    worker,
                    events: events.clone(),
                };
                runtime.serve_blocking(worker, request_rx, events);
            })
            .map_err(|e| SpawnError::from(format!("failed to spawn worker thread: {}", e)))?;

        Ok(SpawnedWorker {
            requests: request_tx,
        })
    }
}

/// Reports thread exit to the pool, including panic unwinds.
struct ExitGuard {
    worker: WorkerId,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let error = if std::thread::panicking() {
            Some("worker thread panicked".to_string())
        } else {
            None
        };
        let _ = self.events.send(WorkerEvent::Exited {
            worker: self.worker,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallRequest, CallResponse};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_spawn_reports_ready_and_serves() {
        let registry = MethodRegistry::new();
        registry.register_fn("echo", |args| Ok(args[0].clone()));

        let env = ThreadEnvironment::new(registry);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let spawned = env.spawn(1, event_tx).await.unwrap();

        match events.recv().await.unwrap() {
            WorkerEvent::Ready { worker } => assert_eq!(worker, 1),
            other => panic!("expected ready, got {:?}", other),
        }

        let task_id = Uuid::new_v4();
        spawned
            .requests
            .send(CallRequest {
                task_id,
                method: "echo".into(),
                args: vec![json!("hi")],
            })
            .unwrap();

        match events.recv().await.unwrap() {
            WorkerEvent::Response {
                response: CallResponse::Ok { value, .. },
                ..
            } => assert_eq!(value, json!("hi")),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_reported_as_crash() {
        let registry = MethodRegistry::new();
        registry.register_fn("boom", |_| panic!("poison"));

        let env = ThreadEnvironment::new(registry);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let spawned = env.spawn(2, event_tx).await.unwrap();

        let _ready = events.recv().await.unwrap();

        spawned
            .requests
            .send(CallRequest {
                task_id: Uuid::new_v4(),
                method: "boom".into(),
                args: vec![],
            })
            .unwrap();

        match events.recv().await.unwrap() {
            WorkerEvent::Exited { worker, error } => {
                assert_eq!(worker, 2);
                assert!(error.is_some());
            }
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_on_channel_close() {
        let env = ThreadEnvironment::new(MethodRegistry::new());
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let spawned = env.spawn(3, event_tx).await.unwrap();

        let _ready = events.recv().await.unwrap();
        drop(spawned);

        match events.recv().await.unwrap() {
            WorkerEvent::Exited { error, .. } => assert!(error.is_none()),
            other => panic!("expected exit, got {:?}", other),
        }
    }
}
