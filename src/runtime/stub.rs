//! Worker runtime stub: answers call requests inside a worker context.

use tokio::sync::mpsc;

use super::registry::{Callable, MethodRegistry};
use crate::types::{CallRequest, CallResponse, ErrorDescription, WorkerEvent, WorkerId};

/// The stub that runs inside one worker execution context.
///
/// It emits a one-time ready notification, then answers call requests one at
/// a time until its request channel closes. Future-returning callables are
/// awaited before the response is sent, so the single-call-in-flight
/// invariant holds for those too.
pub struct WorkerRuntime {
    registry: MethodRegistry,
}

impl WorkerRuntime {
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// Serve requests on the current (plain OS) thread until the request
    /// channel closes.
    ///
    /// A small current-thread tokio runtime drives async callables; sync
    /// callables run directly. Must not be called from inside an async
    /// context.
    pub fn serve_blocking(
        self,
        worker: WorkerId,
        mut requests: mpsc::UnboundedReceiver<CallRequest>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(worker, error = %e, "worker runtime failed to start");
                return;
            }
        };

        if events.send(WorkerEvent::Ready { worker }).is_err() {
            // Pool already gone
            return;
        }

        tracing::debug!(worker, "worker ready");

        while let Some(request) = requests.blocking_recv() {
            let response = self.handle(&rt, request);
            if events
                .send(WorkerEvent::Response { worker, response })
                .is_err()
            {
                break;
            }
        }

        tracing::debug!(worker, "worker stopped");
    }

    /// Execute one call request and build the response.
    fn handle(&self, rt: &tokio::runtime::Runtime, request: CallRequest) -> CallResponse {
        let CallRequest {
            task_id,
            method,
            args,
        } = request;

        let result = match self.registry.get(&method) {
            None => {
                return CallResponse::Error {
                    task_id,
                    error: ErrorDescription::method_not_found(&method),
                }
            }
            Some(Callable::Sync(f)) => f(&args),
            Some(Callable::Async(f)) => rt.block_on(f(args)),
        };

        match result {
            Ok(value) => CallResponse::Ok { task_id, value },
            Err(message) => CallResponse::Error {
                task_id,
                error: ErrorDescription::execution(message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn serve_on_thread(
        registry: MethodRegistry,
    ) -> (
        mpsc::UnboundedSender<CallRequest>,
        mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            WorkerRuntime::new(registry).serve_blocking(0, req_rx, event_tx);
        });
        (req_tx, event_rx)
    }

    #[test]
    fn test_ready_then_responses() {
        let registry = MethodRegistry::new();
        registry.register_fn("add", |args| {
            let a = args[0].as_i64().ok_or("expected integer")?;
            let b = args[1].as_i64().ok_or("expected integer")?;
            Ok(json!(a + b))
        });

        let (req_tx, mut events) = serve_on_thread(registry);

        match events.blocking_recv().unwrap() {
            WorkerEvent::Ready { worker } => assert_eq!(worker, 0),
            other => panic!("expected ready, got {:?}", other),
        }

        let task_id = Uuid::new_v4();
        req_tx
            .send(CallRequest {
                task_id,
                method: "add".into(),
                args: vec![json!(2), json!(3)],
            })
            .unwrap();

        match events.blocking_recv().unwrap() {
            WorkerEvent::Response { response, .. } => match response {
                CallResponse::Ok { task_id: id, value } => {
                    assert_eq!(id, task_id);
                    assert_eq!(value, json!(5));
                }
                other => panic!("expected ok, got {:?}", other),
            },
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_method_not_found() {
        let (req_tx, mut events) = serve_on_thread(MethodRegistry::new());
        let _ready = events.blocking_recv().unwrap();

        req_tx
            .send(CallRequest {
                task_id: Uuid::new_v4(),
                method: "missing".into(),
                args: vec![],
            })
            .unwrap();

        match events.blocking_recv().unwrap() {
            WorkerEvent::Response {
                response: CallResponse::Error { error, .. },
                ..
            } => {
                assert_eq!(error.kind, crate::types::ErrorKind::MethodNotFound);
                assert!(error.message.contains("missing"));
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_async_callable_awaited() {
        let registry = MethodRegistry::new();
        registry.register_async("delayed", |args| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(args.into_iter().next().unwrap_or(serde_json::Value::Null))
        });

        let (req_tx, mut events) = serve_on_thread(registry);
        let _ready = events.blocking_recv().unwrap();

        req_tx
            .send(CallRequest {
                task_id: Uuid::new_v4(),
                method: "delayed".into(),
                args: vec![json!("done")],
            })
            .unwrap();

        match events.blocking_recv().unwrap() {
            WorkerEvent::Response {
                response: CallResponse::Ok { value, .. },
                ..
            } => assert_eq!(value, json!("done")),
            other => panic!("expected ok response, got {:?}", other),
        }
    }

    #[test]
    fn test_execution_error_preserves_message() {
        let registry = MethodRegistry::new();
        registry.register_fn("fail", |_| Err("Test error".to_string()));

        let (req_tx, mut events) = serve_on_thread(registry);
        let _ready = events.blocking_recv().unwrap();

        req_tx
            .send(CallRequest {
                task_id: Uuid::new_v4(),
                method: "fail".into(),
                args: vec![],
            })
            .unwrap();

        match events.blocking_recv().unwrap() {
            WorkerEvent::Response {
                response: CallResponse::Error { error, .. },
                ..
            } => {
                assert_eq!(error.kind, crate::types::ErrorKind::Execution);
                assert_eq!(error.message, "Test error");
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_stops_when_channel_closes() {
        let registry = MethodRegistry::new();
        let (req_tx, req_rx) = mpsc::unbounded_channel::<CallRequest>();
        let (event_tx, mut events) = mpsc::unbounded_channel();

        let handle = std::thread::spawn(move || {
            WorkerRuntime::new(registry).serve_blocking(7, req_rx, event_tx);
        });

        let _ready = events.blocking_recv().unwrap();
        drop(req_tx);
        handle.join().unwrap();
    }
}
