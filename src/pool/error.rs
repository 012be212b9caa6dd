//! Task and pool error types.

use std::fmt;
use std::time::Duration;

use crate::types::{ErrorDescription, ErrorKind};

/// Errors surfaced to callers through a task's future.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The requested method is not registered in the worker runtime.
    MethodNotFound(String),

    /// The worker execution environment failed to create a worker.
    SpawnFailed(String),

    /// The task did not complete within its timeout.
    TimedOut(Duration),

    /// The task was cancelled by the caller.
    Cancelled,

    /// The assigned worker died and the single crash retry was exhausted.
    WorkerCrashed,

    /// The pool was terminated before the task could complete.
    PoolTerminated,

    /// The method itself failed; the original message is preserved.
    Execution(ErrorDescription),
}

impl TaskError {
    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::TimedOut(_))
    }

    /// Check if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Check if this is an application-level failure from inside the worker.
    pub fn is_execution(&self) -> bool {
        matches!(self, TaskError::Execution(_))
    }

    /// Check if this is a pool-shutdown rejection.
    pub fn is_terminated(&self) -> bool {
        matches!(self, TaskError::PoolTerminated)
    }

    /// Get the error message for logging.
    pub fn message(&self) -> String {
        match self {
            TaskError::MethodNotFound(method) => format!("method not found: {}", method),
            TaskError::SpawnFailed(msg) => msg.clone(),
            TaskError::TimedOut(_) => "task timeout".to_string(),
            TaskError::Cancelled => "task cancelled".to_string(),
            TaskError::WorkerCrashed => "worker crashed".to_string(),
            TaskError::PoolTerminated => "pool terminated".to_string(),
            TaskError::Execution(desc) => desc.message.clone(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::MethodNotFound(method) => {
                write!(f, "method not found: {}", method)
            }
            TaskError::SpawnFailed(msg) => {
                write!(f, "worker spawn failed: {}", msg)
            }
            TaskError::TimedOut(duration) => {
                write!(f, "task timeout after {}ms", duration.as_millis())
            }
            TaskError::Cancelled => {
                write!(f, "task cancelled")
            }
            TaskError::WorkerCrashed => {
                write!(f, "worker crashed and the retry was exhausted")
            }
            TaskError::PoolTerminated => {
                write!(f, "pool has been terminated")
            }
            TaskError::Execution(desc) => match &desc.trace {
                Some(trace) => write!(f, "execution error: {}\n{}", desc.message, trace),
                None => write!(f, "execution error: {}", desc.message),
            },
        }
    }
}

impl std::error::Error for TaskError {}

impl From<ErrorDescription> for TaskError {
    fn from(desc: ErrorDescription) -> Self {
        match desc.kind {
            ErrorKind::MethodNotFound => {
                // The method name travels as its own field; the message is
                // only a fallback for descriptions built by hand.
                TaskError::MethodNotFound(desc.method.unwrap_or(desc.message))
            }
            ErrorKind::Execution => TaskError::Execution(desc),
        }
    }
}

/// Result type alias for task completion.
pub type TaskResult = Result<serde_json::Value, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout() {
        let err = TaskError::TimedOut(Duration::from_millis(10));
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("10ms"));
    }

    #[test]
    fn test_from_description() {
        let err: TaskError = ErrorDescription::method_not_found("missing").into();
        assert!(matches!(err, TaskError::MethodNotFound(ref m) if m == "missing"));

        let err: TaskError = ErrorDescription::execution("boom").into();
        assert!(err.is_execution());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_method_name_carried_structurally() {
        // The name comes from the dedicated field, not from parsing prose.
        let desc = ErrorDescription {
            kind: ErrorKind::MethodNotFound,
            message: "no such method".into(),
            method: Some("fib".into()),
            trace: None,
        };
        let err: TaskError = desc.into();
        assert!(matches!(err, TaskError::MethodNotFound(ref m) if m == "fib"));
    }

    #[test]
    fn test_execution_trace_display() {
        let mut desc = ErrorDescription::execution("boom");
        desc.trace = Some("at add (worker.rs:1)".into());
        let err = TaskError::Execution(desc);
        assert!(err.to_string().contains("worker.rs"));
    }
}
