// src/dag/mod.rs

//! Stage graph representation.
//!
//! - [`stage`] holds a resolved, ready-to-run stage description.
//! - [`graph`] holds the dependency graph and layers it into waves of
//!   mutually independent stages.

pub mod graph;
pub mod stage;

pub use graph::StageGraph;
pub use stage::Stage;
