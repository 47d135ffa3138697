// src/bootstrap/mod.rs

//! Post-apply initialization of the clustered secret service.
//!
//! Exactly one successful run initializes the service and persists its root
//! credential; every later run recovers the credential from the secret store.

pub mod probe;
pub mod protocol;

pub use probe::init_probe_script;
pub use protocol::{
    BootstrapOutcome, BootstrapProtocol, BootstrapSettings, BootstrapState, Credential,
};
