//! Name-to-callable registry for worker methods.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

/// Uniform result type every callable produces.
pub type CallResult = Result<Value, String>;

/// A registered method: a closure with the uniform `(args) -> result-or-error`
/// signature, either synchronous or future-returning.
#[derive(Clone)]
pub enum Callable {
    Sync(Arc<dyn Fn(&[Value]) -> CallResult + Send + Sync>),
    Async(Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, CallResult> + Send + Sync>),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Sync(_) => f.write_str("Callable::Sync"),
            Callable::Async(_) => f.write_str("Callable::Async"),
        }
    }
}

/// Mapping from method name to callable.
///
/// Cloning is cheap (shared map); registration may happen incrementally and
/// overwriting an existing name is allowed, last registration wins.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: Arc<RwLock<HashMap<String, Callable>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callable under `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, callable: Callable) {
        let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
        methods.insert(name.into(), callable);
    }

    /// Register a synchronous method.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> CallResult + Send + Sync + 'static,
    {
        self.register(name, Callable::Sync(Arc::new(f)));
    }

    /// Register a future-returning method. The stub awaits the future before
    /// responding; it still accepts only one call at a time.
    pub fn register_async<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = CallResult> + Send + 'static,
    {
        self.register(name, Callable::Async(Arc::new(move |args| f(args).boxed())));
    }

    /// Look up a callable by name.
    pub fn get(&self, name: &str) -> Option<Callable> {
        let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
        methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
        methods.contains_key(name)
    }

    /// Sorted list of registered method names.
    pub fn names(&self) -> Vec<String> {
        let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
        methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
