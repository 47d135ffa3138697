// src/stage/mod.rs

//! Running one stage through the infrastructure-as-code tool.

pub mod outputs;
pub mod runner;

pub use outputs::{OutputValue, StageOutputs, StageResult, parse_outputs};
pub use runner::StageRunner;
