//! Handler module: method handlers and the registry that dispatches them.
//!
//! A handler is a function from JSON-text params to JSON-text result that
//! may fail with a [`HandlerError`]. The [`MethodRegistry`] maps exact,
//! case-sensitive method names to handlers.
//!
//! # Example
//!
//! ```
//! use wirecall::handler::{HandlerError, MethodRegistry};
//!
//! let registry = MethodRegistry::new();
//! registry.register("echo", |params: String| async move { Ok(params) });
//! registry.register("reject", |_params: String| async move {
//!     Err(HandlerError::invalid_params("always rejects"))
//! });
//!
//! assert!(registry.lookup("echo").is_some());
//! assert!(registry.lookup("Echo").is_none());
//! ```

mod registry;

pub use registry::{
    BoxFuture, HandlerError, HandlerResult, MethodHandler, MethodRegistry,
};
