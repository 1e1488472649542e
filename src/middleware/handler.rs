use std::fmt;
use std::sync::Arc;

use super::chain::Next;
use super::error::{HandlerFailure, HandlerResult};

/// Arguments shared by every handler of one dispatch.
///
/// `count` is the argument count used by arity classification. Tuples
/// report their length, so `(ctx,)` counts as one argument.
pub trait Arguments: Send + Sync + 'static {
    fn count(&self) -> usize;
}

macro_rules! tuple_arguments {
    ($($len:expr => ($($name:ident),*)),* $(,)?) => {
        $(
            impl<$($name: Send + Sync + 'static),*> Arguments for ($($name,)*) {
                fn count(&self) -> usize {
                    $len
                }
            }
        )*
    };
}

tuple_arguments! {
    0 => (),
    1 => (T1),
    2 => (T1, T2),
    3 => (T1, T2, T3),
    4 => (T1, T2, T3, T4),
    5 => (T1, T2, T3, T4, T5),
    6 => (T1, T2, T3, T4, T5, T6),
}

impl<T: Send + Sync + 'static> Arguments for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }
}

/// Role a handler plays in one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Normal,
    Error,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Normal => f.write_str("normal"),
            Role::Error => f.write_str("error"),
        }
    }
}

/// How a handler declared its role at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    /// Explicit tag, independent of the argument count.
    Tagged(Role),
    /// Declared parameter count, classified against each dispatch.
    Arity(usize),
}

/// What a handler receives when it is invoked.
///
/// `failure` is `Some` only when the handler runs as the error handler.
pub struct Invocation<'a, A> {
    pub failure: Option<HandlerFailure>,
    pub args: &'a A,
    pub next: Next,
}

type HandlerFn<A> = dyn for<'a> Fn(Invocation<'a, A>) -> HandlerResult + Send + Sync;

fn erase<A, F>(f: F) -> Arc<HandlerFn<A>>
where
    F: for<'a> Fn(Invocation<'a, A>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A registered middleware callable.
pub struct Handler<A> {
    name: Option<Arc<str>>,
    declared: Declared,
    func: Arc<HandlerFn<A>>,
}

impl<A> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            declared: self.declared,
            func: Arc::clone(&self.func),
        }
    }
}

impl<A> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

impl<A: Arguments> Handler<A> {
    /// Normal handler: receives the arguments and the continuation.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: None,
            declared: Declared::Tagged(Role::Normal),
            func: erase(move |inv: Invocation<'_, A>| f(inv.args, inv.next)),
        }
    }

    /// Error handler: receives the failure, the arguments and a terminal
    /// continuation.
    pub fn error<F>(f: F) -> Self
    where
        F: Fn(HandlerFailure, &A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: None,
            declared: Declared::Tagged(Role::Error),
            func: erase(move |inv: Invocation<'_, A>| match inv.failure {
                Some(failure) => f(failure, inv.args, inv.next),
                None => Ok(()),
            }),
        }
    }

    /// Handler whose role is inferred from a declared parameter count.
    ///
    /// With `n` dispatch arguments, `arity >= n + 2` makes it the error
    /// handler (failure, arguments, continuation); anything less makes it
    /// a normal handler.
    pub fn with_arity<F>(arity: usize, f: F) -> Self
    where
        F: for<'a> Fn(Invocation<'a, A>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: None,
            declared: Declared::Arity(arity),
            func: erase(f),
        }
    }
}

impl<A> Handler<A> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Arc::from(name.into()));
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn declared(&self) -> Declared {
        self.declared
    }

    /// Classify against a dispatch carrying `argc` arguments.
    pub fn role(&self, argc: usize) -> Role {
        match self.declared {
            Declared::Tagged(role) => role,
            Declared::Arity(arity) if arity >= argc + 2 => Role::Error,
            Declared::Arity(_) => Role::Normal,
        }
    }

    pub fn info(&self) -> HandlerInfo {
        HandlerInfo {
            name: self.name().to_string(),
            declared: self.declared,
        }
    }

    pub(crate) fn invoke(&self, invocation: Invocation<'_, A>) -> HandlerResult {
        (self.func)(invocation)
    }
}

/// Inspection view of a registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub name: String,
    pub declared: Declared,
}

/// A handler or an arbitrarily nested stack of handlers.
pub enum Layer<A> {
    Handler(Handler<A>),
    Stack(Vec<Layer<A>>),
}

impl<A> From<Handler<A>> for Layer<A> {
    fn from(handler: Handler<A>) -> Self {
        Layer::Handler(handler)
    }
}

impl<A> From<Vec<Handler<A>>> for Layer<A> {
    fn from(handlers: Vec<Handler<A>>) -> Self {
        Layer::Stack(handlers.into_iter().map(Layer::Handler).collect())
    }
}

impl<A> From<Vec<Layer<A>>> for Layer<A> {
    fn from(layers: Vec<Layer<A>>) -> Self {
        Layer::Stack(layers)
    }
}

/// Flatten layers depth-first, keeping order.
pub(crate) fn flatten<A>(layers: impl IntoIterator<Item = Layer<A>>, out: &mut Vec<Handler<A>>) {
    for layer in layers {
        match layer {
            Layer::Handler(handler) => out.push(handler),
            Layer::Stack(nested) => flatten(nested, out),
        }
    }
}
