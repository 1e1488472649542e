//! Middleware pipeline
//!
//! An ordered chain-of-responsibility over a shared set of arguments.
//!
//! ## Key Components
//!
//! - [`Pipeline`] - registry of handlers plus the dispatcher (`handle`)
//! - [`Handler`] - a registered callable, tagged as normal or error handler
//!   or classified by declared arity
//! - [`Next`] - single-fire continuation handed to each handler
//! - [`Catalog`] - named handlers for configuration-driven stacks
//!
//! ## Error routing
//!
//! A handler reports a failure with [`Next::fail`] or by returning `Err`.
//! The failure skips every handler that has not run yet and goes to the
//! error handler, if one is registered, or back to the caller of
//! [`Pipeline::handle`] as [`DispatchError::Unrouted`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use mixin_kit::middleware::Pipeline;
//!
//! let pipeline: Pipeline<(Arc<AtomicUsize>,)> = Pipeline::new();
//! pipeline
//!     .use_fn(|(count,), next| {
//!         count.fetch_add(1, Ordering::SeqCst);
//!         next.call();
//!         Ok(())
//!     })
//!     .use_error_fn(|err, _, _| {
//!         eprintln!("recovered: {err}");
//!         Ok(())
//!     });
//!
//! let count = Arc::new(AtomicUsize::new(0));
//! pipeline.handle((Arc::clone(&count),)).unwrap();
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

mod catalog;
mod chain;
mod error;
mod handler;
mod pipeline;

pub use catalog::{Catalog, JsonArgs};
pub use chain::Next;
pub use error::{DispatchError, HandlerFailure, HandlerResult, RegistrationError};
pub use handler::{Arguments, Declared, Handler, HandlerInfo, Invocation, Layer, Role};
pub use pipeline::{Pipeline, PipelineOptions, DEFAULT_PIPELINE_NAME};

pub(crate) use catalog::json_type;
