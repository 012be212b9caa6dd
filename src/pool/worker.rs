//! Pool-side worker handle: one worker's lifecycle and in-flight task.

use std::time::{Duration, Instant};

use super::task::Task;
use crate::env::SpawnedWorker;
use crate::types::{CallRequest, TaskId, WorkerId};

/// Lifecycle state of a worker handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// The execution context was requested but has not signalled readiness.
    Spawning,
    /// Ready for a task.
    Idle,
    /// Exactly one task assigned and in flight.
    Busy,
    /// Finishing its in-flight task before going away (graceful shutdown).
    Terminating,
    /// Gone; the handle is about to be dropped.
    Terminated,
}

/// The pool's proxy for one worker execution context.
///
/// Invariant: the handle is `Busy` (or `Terminating`) if and only if
/// `current` holds exactly one task; it is never handed a second task
/// while one is in flight.
pub struct WorkerHandle {
    id: WorkerId,
    state: WorkerState,
    spawned: SpawnedWorker,
    current: Option<Task>,
    completed: u64,
    idle_since: Instant,
}

impl WorkerHandle {
    /// A freshly requested worker, waiting for its ready signal.
    pub fn new(id: WorkerId, spawned: SpawnedWorker) -> Self {
        Self {
            id,
            state: WorkerState::Spawning,
            spawned,
            current: None,
            completed: 0,
            idle_since: Instant::now(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_spawning(&self) -> bool {
        self.state == WorkerState::Spawning
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, WorkerState::Busy | WorkerState::Terminating)
    }

    /// Tasks completed by this worker so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// How long the worker has been idle (meaningful only while `Idle`).
    pub fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }

    /// Id of the in-flight task, if any.
    pub fn current_task_id(&self) -> Option<TaskId> {
        self.current.as_ref().map(|t| t.id())
    }

    /// Spawning -> Idle, on the environment's ready signal.
    pub fn mark_ready(&mut self) {
        debug_assert_eq!(self.state, WorkerState::Spawning);
        self.state = WorkerState::Idle;
        self.idle_since = Instant::now();
    }

    /// Busy -> Terminating, when a graceful shutdown lets the in-flight
    /// task finish first.
    pub fn mark_terminating(&mut self) {
        debug_assert_eq!(self.state, WorkerState::Busy);
        self.state = WorkerState::Terminating;
    }

    /// Send a task to the worker. Precondition: the handle is `Idle`.
    ///
    /// Returns the task back if the underlying context is already gone
    /// (its request channel closed); the caller requeues it and drops
    /// this handle.
    pub fn dispatch(&mut self, mut task: Task) -> Result<(), Task> {
        debug_assert_eq!(self.state, WorkerState::Idle);
        debug_assert!(self.current.is_none());

        task.mark_assigned();
        let request = CallRequest {
            task_id: task.id(),
            method: task.method().to_string(),
            args: task.args().to_vec(),
        };

        if self.spawned.requests.send(request).is_err() {
            return Err(task);
        }

        task.mark_running();
        self.current = Some(task);
        self.state = WorkerState::Busy;
        Ok(())
    }

    /// Take the in-flight task after its response arrived; the worker
    /// becomes idle and its completion count grows.
    pub fn finish_current(&mut self) -> Option<Task> {
        let task = self.current.take()?;
        self.completed += 1;
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
            self.idle_since = Instant::now();
        }
        Some(task)
    }

    /// Take the in-flight task without completing it (timeout, cancel,
    /// crash, forced shutdown). The handle is expected to be dropped after.
    pub fn take_current(&mut self) -> Option<Task> {
        self.current.take()
    }

    /// Mark the handle terminated before dropping it. Dropping closes the
    /// request channel, which orders the context to stop.
    pub fn shutdown(mut self) {
        self.state = WorkerState::Terminated;
        tracing::debug!(worker = self.id, completed = self.completed, "worker terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(id: WorkerId) -> (WorkerHandle, mpsc::UnboundedReceiver<CallRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WorkerHandle::new(id, SpawnedWorker { requests: tx }), rx)
    }

    #[test]
    fn test_spawning_to_idle() {
        let (mut worker, _rx) = handle(1);
        assert!(worker.is_spawning());
        worker.mark_ready();
        assert!(worker.is_idle());
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_dispatch_makes_busy_and_sends_request() {
        let (mut worker, mut rx) = handle(1);
        worker.mark_ready();

        let (task, _task_rx) = Task::new("add", vec![], None);
        let id = task.id();
        worker.dispatch(task).unwrap();

        assert!(worker.is_busy());
        assert_eq!(worker.current_task_id(), Some(id));

        let request = rx.try_recv().unwrap();
        assert_eq!(request.task_id, id);
        assert_eq!(request.method, "add");
    }

    #[test]
    fn test_dispatch_to_dead_worker_returns_task() {
        let (mut worker, rx) = handle(1);
        worker.mark_ready();
        drop(rx);

        let (task, _task_rx) = Task::new("add", vec![], None);
        let returned = worker.dispatch(task).unwrap_err();
        assert_eq!(returned.method(), "add");
        assert!(worker.current_task_id().is_none());
    }

    #[test]
    fn test_finish_returns_to_idle_and_counts() {
        let (mut worker, _rx) = handle(1);
        worker.mark_ready();

        let (task, _task_rx) = Task::new("add", vec![], None);
        worker.dispatch(task).unwrap();

        let finished = worker.finish_current().unwrap();
        assert_eq!(finished.method(), "add");
        assert!(worker.is_idle());
        assert_eq!(worker.completed(), 1);
    }

    #[test]
    fn test_terminating_keeps_task_until_finish() {
        let (mut worker, _rx) = handle(1);
        worker.mark_ready();

        let (task, _task_rx) = Task::new("slow", vec![], None);
        worker.dispatch(task).unwrap();
        worker.mark_terminating();

        assert!(worker.is_busy());
        assert!(worker.current_task_id().is_some());

        worker.finish_current().unwrap();
        // Terminating workers do not return to Idle
        assert_eq!(worker.state(), WorkerState::Terminating);
    }
}
