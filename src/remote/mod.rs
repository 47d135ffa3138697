// src/remote/mod.rs

//! Waiting for instances and running scripts on them.

pub mod executor;
pub mod readiness;

pub use executor::RemoteExecutor;
pub use readiness::{ReadinessPolicy, wait_ready};
