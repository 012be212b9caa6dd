//! Task value object, lifecycle state machine, and the FIFO task queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::error::{TaskError, TaskResult};
use crate::types::TaskId;

/// Lifecycle state of a task.
///
/// Terminal states are final; a task never re-enters `Queued` after leaving
/// it, except for the single crash-triggered requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the queue for an idle worker.
    Queued,
    /// Popped from the queue, handed to a worker handle.
    Assigned,
    /// The call request has been sent to the worker runtime.
    Running,
    /// Completed with a value.
    Resolved,
    /// Completed with an error.
    Rejected,
    /// Rejected because the timeout fired first.
    TimedOut,
    /// Rejected by caller cancellation.
    Cancelled,
}

impl TaskState {
    /// True once the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Resolved | TaskState::Rejected | TaskState::TimedOut | TaskState::Cancelled
        )
    }
}

/// One requested method invocation plus its completion channel.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    method: String,
    args: Vec<Value>,
    timeout: Option<Duration>,
    state: TaskState,
    /// Set when the task was requeued after its worker died; a second crash
    /// rejects instead of retrying again.
    retried_after_crash: bool,
    response_tx: Option<oneshot::Sender<TaskResult>>,
    submitted_at: Instant,
}

impl Task {
    /// Create a queued task. The returned receiver settles exactly once,
    /// when the task reaches a terminal state.
    pub fn new(
        method: impl Into<String>,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> (Self, oneshot::Receiver<TaskResult>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id: Uuid::new_v4(),
            method: method.into(),
            args,
            timeout,
            state: TaskState::Queued,
            retried_after_crash: false,
            response_tx: Some(tx),
            submitted_at: Instant::now(),
        };
        (task, rx)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn retried_after_crash(&self) -> bool {
        self.retried_after_crash
    }

    /// Time spent since submission (queue wait + execution so far).
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Queued -> Assigned, when the dispatch step picks a worker.
    pub fn mark_assigned(&mut self) {
        debug_assert_eq!(self.state, TaskState::Queued);
        self.state = TaskState::Assigned;
    }

    /// Assigned -> Running, once the call request is on the wire.
    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.state, TaskState::Assigned);
        self.state = TaskState::Running;
    }

    /// Running -> Queued after the assigned worker died. Allowed once.
    pub fn mark_crash_requeued(&mut self) {
        debug_assert!(!self.retried_after_crash);
        self.retried_after_crash = true;
        self.state = TaskState::Queued;
    }

    /// Settle the task with a value. Consumes the task.
    pub fn resolve(mut self, value: Value) {
        self.state = TaskState::Resolved;
        if let Some(tx) = self.response_tx.take() {
            let _ = tx.send(Ok(value));
        }
    }

    /// Settle the task with an error. Consumes the task.
    pub fn reject(mut self, error: TaskError) {
        self.state = match error {
            TaskError::TimedOut(_) => TaskState::TimedOut,
            TaskError::Cancelled => TaskState::Cancelled,
            _ => TaskState::Rejected,
        };
        if let Some(tx) = self.response_tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}

/// FIFO queue of pending tasks.
///
/// Only ever mutated from within the pool's dispatch step. The single
/// allowed reordering is the crash-triggered requeue, which reinserts at
/// the front.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newly submitted task.
    pub fn push_back(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Reinsert a crash-requeued task ahead of all waiting tasks.
    pub fn push_front(&mut self, task: Task) {
        self.tasks.push_front(task);
    }

    /// Pop the oldest task.
    pub fn pop_front(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Remove a queued task by id (cheap cancellation path).
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id() == id)?;
        self.tasks.remove(index)
    }

    /// Drain every queued task (pool termination).
    pub fn drain(&mut self) -> impl Iterator<Item = Task> + '_ {
        self.tasks.drain(..)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(method: &str) -> Task {
        Task::new(method, vec![], None).0
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.push_back(task("a"));
        queue.push_back(task("b"));
        queue.push_back(task("c"));

        assert_eq!(queue.pop_front().unwrap().method(), "a");
        assert_eq!(queue.pop_front().unwrap().method(), "b");
        assert_eq!(queue.pop_front().unwrap().method(), "c");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_crash_requeue_goes_to_front() {
        let mut queue = TaskQueue::new();
        queue.push_back(task("waiting"));

        let (mut crashed, _rx) = Task::new("crashed", vec![], None);
        crashed.mark_assigned();
        crashed.mark_running();
        crashed.mark_crash_requeued();
        assert!(crashed.retried_after_crash());
        assert_eq!(crashed.state(), TaskState::Queued);

        queue.push_front(crashed);
        assert_eq!(queue.pop_front().unwrap().method(), "crashed");
        assert_eq!(queue.pop_front().unwrap().method(), "waiting");
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = TaskQueue::new();
        let t = task("a");
        let id = t.id();
        queue.push_back(t);
        queue.push_back(task("b"));

        let removed = queue.remove(id).unwrap();
        assert_eq!(removed.method(), "a");
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(id).is_none());
    }

    #[tokio::test]
    async fn test_resolve_settles_future() {
        let (task, rx) = Task::new("add", vec![json!(1)], None);
        task.resolve(json!(2));
        assert_eq!(rx.await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_reject_sets_matching_state() {
        let (task, rx) = Task::new("slow", vec![], None);
        task.reject(TaskError::Cancelled);
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Resolved.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }
}
