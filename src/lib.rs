//! Capability fragments that can be layered onto any base type: a
//! middleware dispatch [`Pipeline`](middleware::Pipeline) and a
//! [`Settings`](settings::Settings) store.

pub mod capability;
pub mod config;
pub mod middleware;
pub mod observability;
pub mod settings;
