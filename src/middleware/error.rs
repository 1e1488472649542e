use thiserror::Error;

/// Any value a handler reports, either through [`Next::fail`](super::Next::fail)
/// or by returning `Err` from its body.
pub type HandlerFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by every handler body.
pub type HandlerResult = Result<(), HandlerFailure>;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("use requires at least one middleware handler")]
    Empty,

    #[error("{found} is an invalid type for use")]
    NotCallable { found: &'static str },

    #[error("no handler named '{0}' in catalog")]
    UnknownHandler(String),
}

/// Failure raised to the caller of [`Pipeline::handle`](super::Pipeline::handle).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler reported a failure and no error handler was registered.
    #[error("{0}")]
    Unrouted(HandlerFailure),

    /// The error handler itself failed while handling a failure.
    #[error("error handler failed: {0}")]
    ErrorHandlerFailed(HandlerFailure),
}

impl DispatchError {
    /// Give back the reported value, e.g. to downcast it.
    pub fn into_failure(self) -> HandlerFailure {
        match self {
            DispatchError::Unrouted(failure) | DispatchError::ErrorHandlerFailed(failure) => {
                failure
            }
        }
    }

    pub fn failure(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            DispatchError::Unrouted(failure) | DispatchError::ErrorHandlerFailed(failure) => {
                failure.as_ref()
            }
        }
    }
}
