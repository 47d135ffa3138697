// src/exec/mod.rs

//! Process execution seam.
//!
//! Everything that shells out (the infrastructure-as-code tool, the AWS CLI,
//! stage hooks, overlay commands) goes through [`ProcessRunner`], so tests can
//! swap in a scripted fake without spawning real processes.

use std::future::Future;
use std::pin::Pin;

pub mod process;

pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner, shell};

/// Boxed, `Send` future used by the object-safe async traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
