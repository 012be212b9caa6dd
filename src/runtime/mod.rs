//! Code that runs inside a worker execution context.
//!
//! A worker context holds a [`MethodRegistry`] (name to callable mapping)
//! and a [`WorkerRuntime`] stub that answers incoming call requests with
//! results or error descriptions. The stub handles exactly one call at a
//! time, which is what lets the pool side treat a busy worker as owning
//! exactly one task.

mod registry;
mod stub;

pub use registry::{Callable, MethodRegistry};
pub use stub::WorkerRuntime;
