//! Domain models for etl-dag
//!
//! Step names, DAG maps and the dependency graph, without any I/O concerns.

mod step;
mod dag;
mod graph;

pub use step::{StepUri, StepUriError, StepVersion};
pub use dag::{Dag, DagPart};
pub use graph::{DependencyGraph, GraphError};
