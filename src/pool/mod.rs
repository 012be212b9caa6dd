//! Worker pool core: task queue, worker handles, and the pool manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Pool                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  submit()/cancel()/terminate()                               │
//! │            │                                                 │
//! │    ┌───────▼────────┐      ┌───────────────┐                 │
//! │    │ dispatch actor │◀─────│ worker events │                 │
//! │    └───────┬────────┘      └───────▲───────┘                 │
//! │            │  FIFO TaskQueue       │                         │
//! │    ┌───────▼───────┬───────────────┴──────┐                  │
//! │    │ WorkerHandle1 │ WorkerHandle2 │ ...  │  (≤ max_workers) │
//! │    └───────┬───────┴───────┬──────────────┘                  │
//! │            │               │                                 │
//! │      worker context   worker context   (thread/process)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All pool-owned state (queue, worker set, dispatch decisions) is mutated
//! by a single actor task, so no lock ever guards it and a task can never be
//! double-assigned.

mod error;
mod manager;
mod task;
mod worker;

pub use error::{TaskError, TaskResult};
pub use manager::{Pool, PoolStatus, TaskHandle};
pub use task::{Task, TaskQueue, TaskState};
pub use worker::{WorkerHandle, WorkerState};
