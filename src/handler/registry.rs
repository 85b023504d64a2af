//! Method registry for dispatching requests by name.
//!
//! Registration is intended as a startup-phase operation; the map is
//! guarded by a reader-writer lock so late registration stays safe while
//! dispatch takes only read locks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::message::ErrorCode;

/// Boxed future returned by handler invocations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure signaled by a handler: a wire error code plus message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    /// Parameter validation failure (INVALID_PARAMS).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidParams,
            message: message.into(),
        }
    }

    /// Internal handler failure (INTERNAL_ERROR).
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
        }
    }

    /// Failure with an explicit code.
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_i32())
    }
}

/// Result type for handler invocations: JSON-text result or failure.
pub type HandlerResult = std::result::Result<String, HandlerError>;

/// Trait for method handlers.
pub trait MethodHandler: Send + Sync + 'static {
    /// Invoke the handler with the request's JSON-text params.
    fn call(&self, params: String) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter implementing [`MethodHandler`] for async closures.
struct FnHandler<F, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> MethodHandler for FnHandler<F, Fut>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: String) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(params))
    }
}

/// Registry mapping method names to handlers.
///
/// Names match exactly and case-sensitively. Lookups clone the handler's
/// `Arc`, so dispatch never holds the lock across an invocation.
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure as a method handler.
    ///
    /// Inserts or replaces: registering an existing name swaps the
    /// handler.
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(
            name,
            Arc::new(FnHandler {
                handler,
                _phantom: PhantomData,
            }),
        );
    }

    /// Register a pre-built handler object.
    pub fn register_handler(&self, name: &str, handler: Arc<dyn MethodHandler>) {
        self.methods
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_owned(), handler);
        tracing::debug!(method = name, "registered RPC method");
    }

    /// Remove a method. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .methods
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some();
        if removed {
            tracing::debug!(method = name, "unregistered RPC method");
        }
        removed
    }

    /// Look up a handler by exact name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.read().expect("registry lock poisoned").len()
    }

    /// True when no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered method names, in arbitrary order.
    pub fn method_names(&self) -> Vec<String> {
        self.methods
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.method_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = MethodRegistry::new();
        registry.register("echo", |params: String| async move { Ok(params) });

        let handler = registry.lookup("echo").unwrap();
        let result = handler.call(r#"{"x":1}"#.to_owned()).await;
        assert_eq!(result.unwrap(), r#"{"x":1}"#);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = MethodRegistry::new();
        registry.register("echo", |params: String| async move { Ok(params) });

        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("Echo").is_none());
        assert!(registry.lookup("ECHO").is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let registry = MethodRegistry::new();
        registry.register("m", |_: String| async move { Ok("old".to_owned()) });
        registry.register("m", |_: String| async move { Ok("new".to_owned()) });

        assert_eq!(registry.len(), 1);
        let handler = registry.lookup("m").unwrap();
        assert_eq!(handler.call(String::new()).await.unwrap(), "new");
    }

    #[test]
    fn test_unregister() {
        let registry = MethodRegistry::new();
        registry.register("gone", |_: String| async move { Ok(String::new()) });

        assert!(registry.unregister("gone"));
        assert!(!registry.unregister("gone"));
        assert!(registry.lookup("gone").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_carries_code() {
        let registry = MethodRegistry::new();
        registry.register("strict", |_: String| async move {
            Err(HandlerError::invalid_params("Missing parameter 'a'"))
        });

        let err = registry
            .lookup("strict")
            .unwrap()
            .call("{}".to_owned())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.message, "Missing parameter 'a'");
    }
}
