//! Capability composition
//!
//! Capabilities are layered onto a base type by wrapping it:
//! `Mixin<B, C>` is `B` plus capability `C`, and derefs to `B`. Stacking
//! works in either order; each host trait is forwarded through the other
//! capability.
//!
//! ```rust
//! use std::sync::Arc;
//! use mixin_kit::capability::{Mixed, MiddlewareHost, SettingsHost};
//! use mixin_kit::middleware::Pipeline;
//! use mixin_kit::settings::Settings;
//! use serde_json::json;
//!
//! let mut app = Mixed
//!     .with(Settings::default())
//!     .with(Pipeline::<(Arc<str>,)>::new());
//!
//! app.set("greeting", json!("hello")).unwrap();
//! app.use_fn(|_, next| {
//!     next.call();
//!     Ok(())
//! });
//! app.handle((Arc::from("request"),)).unwrap();
//! assert_eq!(app.get("greeting"), Some(json!("hello")));
//! ```

use std::ops::{Deref, DerefMut};

use serde_json::Value;

use crate::middleware::{
    Arguments, DispatchError, Handler, HandlerFailure, HandlerResult, Layer, Next, Pipeline,
    RegistrationError,
};
use crate::settings::{Settings, SettingsError};

/// The empty base type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mixed;

impl Mixed {
    pub fn with<C>(self, capability: C) -> Mixin<Self, C> {
        Mixin::new(self, capability)
    }
}

/// `base` augmented with `capability`
#[derive(Debug, Clone, Default)]
pub struct Mixin<B, C> {
    base: B,
    capability: C,
}

impl<B, C> Mixin<B, C> {
    pub fn new(base: B, capability: C) -> Self {
        Self { base, capability }
    }

    /// Layer another capability on top.
    pub fn with<D>(self, capability: D) -> Mixin<Self, D> {
        Mixin::new(self, capability)
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    pub fn capability_mut(&mut self) -> &mut C {
        &mut self.capability
    }

    pub fn into_parts(self) -> (B, C) {
        (self.base, self.capability)
    }
}

impl<B, C> Deref for Mixin<B, C> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.base
    }
}

impl<B, C> DerefMut for Mixin<B, C> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.base
    }
}

/// A type carrying a middleware [`Pipeline`].
///
/// Every method forwards to the pipeline and returns the host, so calls
/// chain on the host rather than on the pipeline.
pub trait MiddlewareHost<A: Arguments> {
    fn pipeline(&self) -> &Pipeline<A>;

    fn use_handler(&self, handler: Handler<A>) -> &Self {
        self.pipeline().use_handler(handler);
        self
    }

    fn use_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.pipeline().use_fn(f);
        self
    }

    fn use_error_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(HandlerFailure, &A, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.pipeline().use_error_fn(f);
        self
    }

    fn use_layers<I, L>(&self, layers: I) -> Result<&Self, RegistrationError>
    where
        I: IntoIterator<Item = L>,
        L: Into<Layer<A>>,
    {
        self.pipeline().use_layers(layers)?;
        Ok(self)
    }

    fn handle(&self, args: A) -> Result<&Self, DispatchError> {
        self.pipeline().handle(args)?;
        Ok(self)
    }
}

/// A type carrying a [`Settings`] store.
pub trait SettingsHost {
    fn settings(&self) -> &Settings;
    fn settings_mut(&mut self) -> &mut Settings;

    fn get(&self, path: &str) -> Option<Value> {
        self.settings().get(path)
    }

    fn set(&mut self, path: &str, value: Value) -> Result<&mut Self, SettingsError> {
        self.settings_mut().set(path, value)?;
        Ok(self)
    }
}

impl<B, A: Arguments> MiddlewareHost<A> for Mixin<B, Pipeline<A>> {
    fn pipeline(&self) -> &Pipeline<A> {
        &self.capability
    }
}

impl<B: MiddlewareHost<A>, A: Arguments> MiddlewareHost<A> for Mixin<B, Settings> {
    fn pipeline(&self) -> &Pipeline<A> {
        self.base.pipeline()
    }
}

impl<B> SettingsHost for Mixin<B, Settings> {
    fn settings(&self) -> &Settings {
        &self.capability
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.capability
    }
}

impl<B: SettingsHost, A: Arguments> SettingsHost for Mixin<B, Pipeline<A>> {
    fn settings(&self) -> &Settings {
        self.base.settings()
    }

    fn settings_mut(&mut self) -> &mut Settings {
        self.base.settings_mut()
    }
}
