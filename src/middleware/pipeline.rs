use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bon::Builder;
use serde_json::Value;

use super::catalog::Catalog;
use super::chain::{self, Dispatch, Next};
use super::error::{DispatchError, HandlerFailure, HandlerResult, RegistrationError};
use super::handler::{flatten, Arguments, Declared, Handler, HandlerInfo, Layer, Role};
use crate::observability::Metrics;

pub const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Construction options for [`Pipeline`]
#[derive(Debug, Clone, Builder)]
pub struct PipelineOptions {
    /// Name used in logs
    #[builder(into, default = DEFAULT_PIPELINE_NAME.to_string())]
    pub name: String,
    /// Counters, possibly shared with other pipelines
    #[builder(default)]
    pub metrics: Arc<Metrics>,
}

/// Ordered middleware stack with chain-of-responsibility dispatch.
///
/// Registration appends to the registry. [`handle`](Pipeline::handle)
/// runs a snapshot of it: registrations made while a dispatch is running
/// only take effect for later dispatches, and dispatch never reorders
/// the registry.
pub struct Pipeline<A> {
    name: Arc<str>,
    registry: RwLock<Vec<Handler<A>>>,
    metrics: Arc<Metrics>,
    next_dispatch: AtomicU64,
}

impl<A: Arguments> Pipeline<A> {
    pub fn new() -> Self {
        Self::with_options(PipelineOptions::builder().build())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::with_options(PipelineOptions::builder().name(name).build())
    }

    pub fn with_options(options: PipelineOptions) -> Self {
        Self {
            name: Arc::from(options.name),
            registry: RwLock::new(Vec::new()),
            metrics: options.metrics,
            next_dispatch: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Append one handler.
    pub fn use_handler(&self, handler: Handler<A>) -> &Self {
        self.append(vec![handler]);
        self
    }

    /// Append a normal handler built from a closure.
    pub fn use_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.use_handler(Handler::new(f))
    }

    /// Append an error handler built from a closure.
    pub fn use_error_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(HandlerFailure, &A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.use_handler(Handler::error(f))
    }

    /// Append handlers and nested stacks, flattened in order.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Empty`] if nothing is left after flattening.
    pub fn use_layers<I, L>(&self, layers: I) -> Result<&Self, RegistrationError>
    where
        I: IntoIterator<Item = L>,
        L: Into<Layer<A>>,
    {
        let mut handlers = Vec::new();
        flatten(layers.into_iter().map(Into::into), &mut handlers);

        if handlers.is_empty() {
            return Err(RegistrationError::Empty);
        }

        self.append(handlers);
        Ok(self)
    }

    /// Append handlers described by configuration values.
    ///
    /// Strings name handlers in `catalog`; arrays are nested stacks.
    /// Nothing is appended if any value fails to resolve.
    pub fn use_values(
        &self,
        catalog: &Catalog<A>,
        values: &[Value],
    ) -> Result<&Self, RegistrationError> {
        let layers = values
            .iter()
            .map(|value| catalog.resolve(value))
            .collect::<Result<Vec<_>, _>>()?;

        self.use_layers(layers)
    }

    fn append(&self, handlers: Vec<Handler<A>>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(
            pipeline = %self.name,
            added = handlers.len(),
            total = registry.len() + handlers.len(),
            "registered middleware"
        );
        registry.extend(handlers);
    }

    fn snapshot(&self) -> Vec<Handler<A>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registered handlers in registration order.
    pub fn handlers(&self) -> Vec<HandlerInfo> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Handler::info)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the middleware stack over `args`.
    ///
    /// Handlers run in registration order, each deciding whether to
    /// continue through its [`Next`]. A handler that defers its `Next`
    /// makes `handle` return while the rest of the chain is pending.
    ///
    /// # Errors
    ///
    /// Returns the reported failure when no error handler is registered
    /// ([`DispatchError::Unrouted`]), or when the error handler itself
    /// fails ([`DispatchError::ErrorHandlerFailed`]).
    pub fn handle(&self, args: A) -> Result<&Self, DispatchError> {
        let argc = args.count();
        let id = self.next_dispatch.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!("dispatch", pipeline = %self.name, id, argc);
        let _entered = span.enter();

        let (handlers, error_handler) = extract_error_handler(self.snapshot(), argc);
        self.metrics.dispatch_started();
        tracing::debug!(
            handlers = handlers.len(),
            error_handler = error_handler.as_ref().map(Handler::name),
            "starting dispatch"
        );

        let dispatch = Dispatch::new(id, args, error_handler, Arc::clone(&self.metrics));
        let head = chain::build(handlers, &dispatch);

        match dispatch.run(&head) {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Split off the first handler classified as the error handler.
///
/// Later handlers that qualify by declared arity stay in the chain and run
/// as normal handlers. Later handlers tagged with [`Handler::error`] have
/// no normal form, so they sit out this dispatch.
fn extract_error_handler<A>(
    snapshot: Vec<Handler<A>>,
    argc: usize,
) -> (Vec<Handler<A>>, Option<Handler<A>>) {
    let mut error_handler = None;
    let mut handlers = Vec::with_capacity(snapshot.len());

    for handler in snapshot {
        match handler.role(argc) {
            Role::Normal => handlers.push(handler),
            Role::Error if error_handler.is_none() => error_handler = Some(handler),
            Role::Error => match handler.declared() {
                Declared::Arity(_) => handlers.push(handler),
                Declared::Tagged(_) => {
                    tracing::warn!(handler = handler.name(), "shadowed error handler skipped");
                }
            },
        }
    }

    (handlers, error_handler)
}

impl<A: Arguments> Default for Pipeline<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Pipeline<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("handlers", &*registry)
            .finish()
    }
}
