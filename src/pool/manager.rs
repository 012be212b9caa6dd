//! Pool manager: submission API and the dispatch actor.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::error::{TaskError, TaskResult};
use super::task::{Task, TaskQueue};
use super::worker::WorkerHandle;
use crate::config::PoolConfig;
use crate::env::{ThreadEnvironment, WorkerEnvironment};
use crate::runtime::MethodRegistry;
use crate::types::{CallResponse, SubmitOptions, TaskId, WorkerEvent, WorkerId};

// =============================================================================
// Public API
// =============================================================================

/// Read-only capacity snapshot, for observability only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStatus {
    /// Workers requested but not yet ready.
    pub spawning: usize,
    /// Workers ready for a task.
    pub idle: usize,
    /// Workers with a task in flight.
    pub busy: usize,
    /// Tasks waiting for capacity.
    pub queued: usize,
}

impl PoolStatus {
    /// Total live workers.
    pub fn workers(&self) -> usize {
        self.spawning + self.idle + self.busy
    }
}

/// The caller-facing future for one submitted task.
///
/// Settles exactly once, when the task reaches a terminal state.
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    /// Id usable with [`Pool::cancel`].
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The task was dropped without settling; only a torn-down pool
            // can cause that.
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::PoolTerminated)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a running worker pool.
///
/// Cheap to clone; the pool shuts down (forced) when the last clone drops.
/// Submission never blocks: it returns a [`TaskHandle`] immediately and all
/// matching happens inside the pool's dispatch actor.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    commands: mpsc::UnboundedSender<Command>,
    terminating: Arc<AtomicBool>,
    gauges: Arc<Gauges>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let (done, _) = oneshot::channel();
        let _ = self.commands.send(Command::Terminate {
            graceful: false,
            done,
        });
    }
}

impl Pool {
    /// Start a pool on the given worker execution environment.
    ///
    /// Must be called from within a tokio runtime; the dispatch actor runs
    /// as a spawned task.
    pub fn start(config: PoolConfig, env: Arc<dyn WorkerEnvironment>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let terminating = Arc::new(AtomicBool::new(false));
        let gauges = Arc::new(Gauges::default());

        let actor = PoolActor {
            config,
            env,
            commands_tx: commands_tx.clone(),
            commands_rx,
            events_tx,
            events_rx,
            workers: HashMap::new(),
            queue: TaskQueue::new(),
            next_worker_id: 0,
            terminating: Arc::clone(&terminating),
            gauges: Arc::clone(&gauges),
            shutdown: None,
            finished: false,
        };
        tokio::spawn(actor.run());

        Self {
            inner: Arc::new(PoolInner {
                commands: commands_tx,
                terminating,
                gauges,
            }),
        }
    }

    /// Start a pool whose workers are OS threads serving `registry`.
    pub fn with_registry(config: PoolConfig, registry: MethodRegistry) -> Self {
        Self::start(config, Arc::new(ThreadEnvironment::new(registry)))
    }

    /// Submit a task. Returns immediately; the handle settles when the task
    /// reaches a terminal state.
    ///
    /// Tasks run at-least-once: if the assigned worker crashes mid-task, the
    /// task is retried exactly once on a fresh worker, so a non-idempotent
    /// method may observe partial re-execution.
    pub fn submit(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        options: SubmitOptions,
    ) -> TaskHandle {
        let (task, rx) = Task::new(method, args, options.timeout);
        let id = task.id();

        if self.inner.terminating.load(Ordering::Acquire) {
            task.reject(TaskError::PoolTerminated);
            return TaskHandle { id, rx };
        }

        if let Err(mpsc::error::SendError(command)) =
            self.inner.commands.send(Command::Submit(task))
        {
            if let Command::Submit(task) = command {
                task.reject(TaskError::PoolTerminated);
            }
        }

        TaskHandle { id, rx }
    }

    /// Cancel a task by id.
    ///
    /// A queued task is removed and rejected cheaply. A running task cannot
    /// be interrupted cooperatively, so its worker is terminated instead;
    /// side effects of the partially executed method may persist.
    pub fn cancel(&self, id: TaskId) {
        let _ = self.inner.commands.send(Command::Cancel(id));
    }

    /// Terminate the pool. Idempotent; a second call awaits the same
    /// shutdown already in flight.
    ///
    /// Queued tasks reject with `PoolTerminated` immediately. With
    /// `graceful`, in-flight tasks finish first; otherwise they are
    /// rejected and their workers dropped.
    pub async fn terminate(&self, graceful: bool) {
        self.inner.terminating.store(true, Ordering::Release);

        let (done, rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(Command::Terminate { graceful, done })
            .is_err()
        {
            // Actor already gone: shutdown finished earlier.
            return;
        }
        let _ = rx.await;
    }

    /// Capacity snapshot (observability only; never a control input).
    pub fn status(&self) -> PoolStatus {
        let gauges = &self.inner.gauges;
        PoolStatus {
            spawning: gauges.spawning.load(Ordering::Relaxed),
            idle: gauges.idle.load(Ordering::Relaxed),
            busy: gauges.busy.load(Ordering::Relaxed),
            queued: gauges.queued.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Dispatch actor
// =============================================================================

#[derive(Default)]
struct Gauges {
    spawning: AtomicUsize,
    idle: AtomicUsize,
    busy: AtomicUsize,
    queued: AtomicUsize,
}

enum Command {
    Submit(Task),
    Cancel(TaskId),
    Terminate {
        graceful: bool,
        done: oneshot::Sender<()>,
    },
    TaskTimeout {
        worker: WorkerId,
        task: TaskId,
        timeout: Duration,
    },
}

struct Shutdown {
    waiters: Vec<oneshot::Sender<()>>,
}

/// Owns all pool state. Every mutation of the queue and the worker set
/// happens inside this actor's loop, which is the dispatch critical section.
struct PoolActor {
    config: PoolConfig,
    env: Arc<dyn WorkerEnvironment>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    workers: HashMap<WorkerId, WorkerHandle>,
    queue: TaskQueue,
    next_worker_id: WorkerId,
    terminating: Arc<AtomicBool>,
    gauges: Arc<Gauges>,
    shutdown: Option<Shutdown>,
    finished: bool,
}

impl PoolActor {
    async fn run(mut self) {
        info!(
            min = self.config.min(),
            max = self.config.max(),
            "pool started"
        );

        self.ensure_min_workers().await;
        self.update_gauges();

        let reap_period = self
            .config
            .idle()
            .map(|d| (d / 2).max(Duration::from_millis(50)))
            .unwrap_or(Duration::from_secs(60));
        let mut reaper = tokio::time::interval(reap_period);
        reaper.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.finished {
            tokio::select! {
                Some(command) = self.commands_rx.recv() => self.handle_command(command).await,
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                _ = reaper.tick() => self.reap_idle(),
            }
            self.update_gauges();
        }

        info!("pool terminated");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(task) => {
                if self.shutdown.is_some() {
                    task.reject(TaskError::PoolTerminated);
                    return;
                }
                debug!(task = %task.id(), method = task.method(), "task queued");
                self.queue.push_back(task);
                self.dispatch().await;
            }
            Command::Cancel(id) => self.cancel(id).await,
            Command::Terminate { graceful, done } => self.terminate(graceful, done),
            Command::TaskTimeout {
                worker,
                task,
                timeout,
            } => self.handle_timeout(worker, task, timeout).await,
        }
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready { worker } => {
                if self.shutdown.is_some() {
                    // Late spawn during shutdown: drop it.
                    if let Some(handle) = self.workers.remove(&worker) {
                        handle.shutdown();
                    }
                    self.check_shutdown_complete();
                    return;
                }
                if let Some(handle) = self.workers.get_mut(&worker) {
                    handle.mark_ready();
                    debug!(worker, "worker ready");
                    self.dispatch().await;
                }
            }
            WorkerEvent::Response { worker, response } => {
                self.handle_response(worker, response).await;
            }
            WorkerEvent::Exited { worker, error } => {
                self.handle_exit(worker, error).await;
            }
        }
    }

    /// The dispatch critical section: match queued tasks to idle workers,
    /// then spawn headroom for whatever is still waiting.
    async fn dispatch(&mut self) {
        if self.shutdown.is_some() {
            return;
        }

        // Step 1: oldest task to an idle worker, repeatedly.
        while !self.queue.is_empty() {
            let Some(worker_id) = self
                .workers
                .values()
                .find(|w| w.is_idle())
                .map(|w| w.id())
            else {
                break;
            };

            let task = match self.queue.pop_front() {
                Some(task) => task,
                None => break,
            };
            self.assign(worker_id, task);
        }

        // Step 2: spawn for queued work not already covered by a worker
        // that is about to become ready.
        let spawning = self.workers.values().filter(|w| w.is_spawning()).count();
        let uncovered = self.queue.len().saturating_sub(spawning);
        let headroom = self.config.max().saturating_sub(self.workers.len());
        let mut wanted = uncovered.min(headroom);

        while wanted > 0 {
            if !self.spawn_worker().await {
                // Retried on the next dispatch trigger. With no live workers
                // at all there is no such trigger, so fail the queued tasks
                // rather than strand them.
                if self.workers.is_empty() {
                    let drained: Vec<Task> = self.queue.drain().collect();
                    for task in drained {
                        task.reject(TaskError::SpawnFailed(
                            "no worker could be spawned".to_string(),
                        ));
                    }
                }
                break;
            }
            wanted -= 1;
        }

        self.ensure_min_workers().await;
    }

    /// Hand one task to one idle worker, arming its timeout timer.
    fn assign(&mut self, worker_id: WorkerId, task: Task) {
        let task_id = task.id();
        let timeout = task.timeout();

        let Some(worker) = self.workers.get_mut(&worker_id) else {
            self.queue.push_front(task);
            return;
        };

        match worker.dispatch(task) {
            Ok(()) => {
                debug!(worker = worker_id, task = %task_id, "task dispatched");
                if let Some(timeout) = timeout {
                    let commands = self.commands_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        let _ = commands.send(Command::TaskTimeout {
                            worker: worker_id,
                            task: task_id,
                            timeout,
                        });
                    });
                }
            }
            Err(task) => {
                // The context died before we noticed its exit event; the
                // task was never sent, so requeuing it costs no retry.
                warn!(worker = worker_id, "worker gone at dispatch, requeuing task");
                if let Some(handle) = self.workers.remove(&worker_id) {
                    handle.shutdown();
                }
                self.queue.push_front(task);
            }
        }
    }

    async fn spawn_worker(&mut self) -> bool {
        let id = self.next_worker_id;
        self.next_worker_id += 1;

        match self.env.spawn(id, self.events_tx.clone()).await {
            Ok(spawned) => {
                debug!(worker = id, "worker spawning");
                self.workers.insert(id, WorkerHandle::new(id, spawned));
                true
            }
            Err(e) => {
                warn!(worker = id, error = %e, "worker spawn failed");
                false
            }
        }
    }

    async fn ensure_min_workers(&mut self) {
        if self.shutdown.is_some() {
            return;
        }
        while self.workers.len() < self.config.min() {
            if !self.spawn_worker().await {
                break;
            }
        }
    }

    async fn handle_response(&mut self, worker: WorkerId, response: CallResponse) {
        let Some(handle) = self.workers.get_mut(&worker) else {
            // Terminated worker's late response: never misattributed.
            return;
        };

        if handle.current_task_id() != Some(response.task_id()) {
            warn!(worker, task = %response.task_id(), "stale response ignored");
            return;
        }

        let task = match handle.finish_current() {
            Some(task) => task,
            None => return,
        };

        debug!(worker, task = %task.id(), elapsed_ms = task.elapsed().as_millis() as u64, "task settled");

        match response {
            CallResponse::Ok { value, .. } => task.resolve(value),
            CallResponse::Error { error, .. } => task.reject(error.into()),
        }

        if self.shutdown.is_some() {
            // Graceful shutdown: this worker just finished its last task.
            if let Some(handle) = self.workers.remove(&worker) {
                handle.shutdown();
            }
            self.check_shutdown_complete();
            return;
        }

        // Recycle policy: quota reached, replace with a fresh context.
        let recycle = self
            .config
            .task_quota()
            .is_some_and(|quota| self.workers[&worker].completed() >= quota);
        if recycle {
            info!(worker, "worker recycled after task quota");
            if let Some(handle) = self.workers.remove(&worker) {
                handle.shutdown();
            }
        }

        self.dispatch().await;
    }

    async fn handle_exit(&mut self, worker: WorkerId, error: Option<String>) {
        let Some(mut handle) = self.workers.remove(&worker) else {
            // We terminated it deliberately; nothing to do.
            return;
        };

        match handle.take_current() {
            Some(mut task) => {
                if self.shutdown.is_some() {
                    task.reject(TaskError::WorkerCrashed);
                } else if task.retried_after_crash() {
                    warn!(worker, task = %task.id(), "worker crashed again, rejecting task");
                    task.reject(TaskError::WorkerCrashed);
                } else {
                    info!(worker, task = %task.id(), error = error.as_deref().unwrap_or("exited"), "worker died mid-task, retrying once");
                    task.mark_crash_requeued();
                    self.queue.push_front(task);
                }
            }
            None => {
                debug!(worker, "worker exited");
            }
        }
        handle.shutdown();

        if self.shutdown.is_some() {
            self.check_shutdown_complete();
        } else {
            self.dispatch().await;
        }
    }

    async fn handle_timeout(&mut self, worker: WorkerId, task_id: TaskId, timeout: Duration) {
        let still_running = self
            .workers
            .get(&worker)
            .is_some_and(|h| h.current_task_id() == Some(task_id));
        if !still_running {
            // Completed (or the worker died) before the timer fired.
            return;
        }

        // The context cannot be interrupted mid-call; terminate the worker
        // so a late response can never be misattributed.
        let mut handle = match self.workers.remove(&worker) {
            Some(handle) => handle,
            None => return,
        };
        if let Some(task) = handle.take_current() {
            warn!(worker, task = %task.id(), timeout_ms = timeout.as_millis() as u64, "task timeout, terminating worker");
            task.reject(TaskError::TimedOut(timeout));
        }
        handle.shutdown();

        if self.shutdown.is_some() {
            self.check_shutdown_complete();
        } else {
            self.dispatch().await;
        }
    }

    async fn cancel(&mut self, id: TaskId) {
        // Still queued: cheap removal, no worker involved.
        if let Some(task) = self.queue.remove(id) {
            debug!(task = %id, "queued task cancelled");
            task.reject(TaskError::Cancelled);
            return;
        }

        // Running: same remedy as a timeout.
        let target = self
            .workers
            .values()
            .find(|h| h.current_task_id() == Some(id))
            .map(|h| h.id());
        let Some(worker) = target else {
            return; // Unknown or already terminal: no-op.
        };

        let mut handle = match self.workers.remove(&worker) {
            Some(handle) => handle,
            None => return,
        };
        if let Some(task) = handle.take_current() {
            info!(worker, task = %id, "running task cancelled, terminating worker");
            task.reject(TaskError::Cancelled);
        }
        handle.shutdown();
        self.dispatch().await;
    }

    fn terminate(&mut self, graceful: bool, done: oneshot::Sender<()>) {
        if let Some(shutdown) = &mut self.shutdown {
            shutdown.waiters.push(done);
            self.check_shutdown_complete();
            return;
        }

        self.terminating.store(true, Ordering::Release);
        info!(graceful, "pool terminating");

        let drained: Vec<Task> = self.queue.drain().collect();
        for task in drained {
            task.reject(TaskError::PoolTerminated);
        }

        if graceful {
            // Busy workers finish their in-flight task first; everyone else
            // goes now.
            let doomed: Vec<WorkerId> = self
                .workers
                .values()
                .filter(|h| !h.is_busy())
                .map(|h| h.id())
                .collect();
            for id in doomed {
                if let Some(handle) = self.workers.remove(&id) {
                    handle.shutdown();
                }
            }
            for handle in self.workers.values_mut() {
                handle.mark_terminating();
            }
        } else {
            for (_, mut handle) in self.workers.drain() {
                if let Some(task) = handle.take_current() {
                    task.reject(TaskError::PoolTerminated);
                }
                handle.shutdown();
            }
        }

        self.shutdown = Some(Shutdown {
            waiters: vec![done],
        });
        self.check_shutdown_complete();
    }

    fn check_shutdown_complete(&mut self) {
        let Some(shutdown) = &mut self.shutdown else {
            return;
        };
        if !self.workers.is_empty() {
            return;
        }
        for waiter in shutdown.waiters.drain(..) {
            let _ = waiter.send(());
        }
        self.finished = true;
    }

    /// Idle-worker reclamation: shrink back toward `min_workers`.
    fn reap_idle(&mut self) {
        let Some(idle_timeout) = self.config.idle() else {
            return;
        };
        if self.shutdown.is_some() {
            return;
        }

        while self.workers.len() > self.config.min() {
            let expired = self
                .workers
                .values()
                .find(|h| h.is_idle() && h.idle_for() >= idle_timeout)
                .map(|h| h.id());
            let Some(id) = expired else {
                break;
            };
            if let Some(handle) = self.workers.remove(&id) {
                info!(worker = id, "idle worker reclaimed");
                handle.shutdown();
            }
        }
    }

    fn update_gauges(&self) {
        let mut spawning = 0;
        let mut idle = 0;
        let mut busy = 0;
        for handle in self.workers.values() {
            if handle.is_spawning() {
                spawning += 1;
            } else if handle.is_idle() {
                idle += 1;
            } else {
                busy += 1;
            }
        }
        self.gauges.spawning.store(spawning, Ordering::Relaxed);
        self.gauges.idle.store(idle, Ordering::Relaxed);
        self.gauges.busy.store(busy, Ordering::Relaxed);
        self.gauges.queued.store(self.queue.len(), Ordering::Relaxed);
    }
}
