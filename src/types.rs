//! Core types for task submission and the worker wire protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Process-unique task identifier.
pub type TaskId = Uuid;

/// Pool-local worker identifier (monotonic, never reused within one pool).
pub type WorkerId = u32;

// =============================================================================
// Submission options
// =============================================================================

/// Options accepted by [`Pool::submit`](crate::pool::Pool::submit).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Maximum time the task may spend executing (None = no timeout).
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    /// Options with an execution timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

// =============================================================================
// Wire protocol
// =============================================================================

/// A call request sent from a worker handle to its runtime stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Task the response must be attributed to.
    pub task_id: TaskId,
    /// Registered method name to invoke.
    pub method: String,
    /// Ordered argument list.
    pub args: Vec<Value>,
}

/// A call response sent from a runtime stub back to its worker handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CallResponse {
    /// The method completed and produced a value.
    #[serde(rename = "ok")]
    Ok {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        value: Value,
    },
    /// The method was missing or failed.
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        error: ErrorDescription,
    },
}

impl CallResponse {
    /// The task this response belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            CallResponse::Ok { task_id, .. } => *task_id,
            CallResponse::Error { task_id, .. } => *task_id,
        }
    }
}

/// Out-of-band signal from a worker execution context to the pool.
///
/// Environments and runtime stubs push these onto the pool's event channel;
/// the pool ignores events for worker ids it no longer tracks, which is what
/// keeps a terminated worker's late responses from being misattributed.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The runtime stub finished registration and accepts call requests.
    Ready { worker: WorkerId },
    /// The stub answered a call request.
    Response {
        worker: WorkerId,
        response: CallResponse,
    },
    /// The execution context died or exited; `error` is set for crashes.
    Exited {
        worker: WorkerId,
        error: Option<String>,
    },
}

/// Kind of error carried in an [`ErrorDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested method is not registered in the worker.
    MethodNotFound,
    /// The method itself returned or threw an error.
    Execution,
}

/// Serializable description of an error raised inside a worker context.
///
/// Errors never cross the execution-context boundary as live values; only
/// this record (kind + message + optional trace text) does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub kind: ErrorKind,
    pub message: String,
    /// Name of the missing method, set for `MethodNotFound`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub trace: Option<String>,
}

impl ErrorDescription {
    /// Description for a method missing from the registry.
    pub fn method_not_found(method: &str) -> Self {
        Self {
            kind: ErrorKind::MethodNotFound,
            message: format!("method not found: {}", method),
            method: Some(method.to_string()),
            trace: None,
        }
    }

    /// Description for a method that returned an error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Execution,
            message: message.into(),
            method: None,
            trace: None,
        }
    }
}

impl std::fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let id = Uuid::new_v4();
        let ok = CallResponse::Ok {
            task_id: id,
            value: json!(5),
        };
        let encoded = serde_json::to_value(&ok).unwrap();
        assert_eq!(encoded["status"], "ok");
        assert_eq!(encoded["taskId"], json!(id.to_string()));
        assert_eq!(encoded["value"], json!(5));
    }

    #[test]
    fn test_error_wire_shape() {
        let id = Uuid::new_v4();
        let err = CallResponse::Error {
            task_id: id,
            error: ErrorDescription::method_not_found("missing"),
        };
        let encoded = serde_json::to_value(&err).unwrap();
        assert_eq!(encoded["status"], "error");
        assert_eq!(encoded["error"]["kind"], "method_not_found");
        assert_eq!(encoded["error"]["method"], "missing");
        assert!(encoded["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing"));
        assert!(encoded["error"].get("trace").is_none());
    }

    #[test]
    fn test_request_roundtrip() {
        let req = CallRequest {
            task_id: Uuid::new_v4(),
            method: "add".into(),
            args: vec![json!(2), json!(3)],
        };
        let encoded = serde_json::to_string(&req).unwrap();
        assert!(encoded.contains("\"taskId\""));
        let decoded: CallRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.method, "add");
        assert_eq!(decoded.args.len(), 2);
    }
}
