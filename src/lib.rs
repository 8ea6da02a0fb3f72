//! etl-dag - Comment-preserving editing of ETL DAG files
//!
//! An ETL pipeline is described by YAML files mapping each step URI to the
//! steps it depends on. Those files are maintained by hand and carry
//! comments, so etl-dag reads them with a YAML parser but edits them line by
//! line, keeping every comment and blank line it does not need to touch.

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{Dag, DagPart, StepUri, StepVersion};
pub use storage::{
    get_comments_above_step, remove_steps_from_dag_file, write_to_dag_file, Indentation,
    StepCatalog,
};
