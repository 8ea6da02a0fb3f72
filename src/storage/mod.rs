//! # Storage Layer
//!
//! Reads and edits the YAML DAG files of an ETL project.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Steps | YAML (`steps:` / `include:`) | `dag/*.yml` |
//! | Archived steps | YAML | `dag/archive/main.yml` |
//! | Config | TOML | `etl-dag.toml` |
//!
//! ## Editing Rules
//!
//! - Reads go through `serde_yaml` ([`DagLoader`])
//! - Writes never go through a YAML serializer: [`editor`] rewrites lines
//!   so that comments and layout survive
//! - All writes are atomic (temp file + rename)
//! - There is no file locking; a single writer is assumed
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing an etl-dag project
//! - [`StepCatalog`] - Steps, their files and their dependencies
//! - [`DagLoader`] - Loads a DAG file and everything it includes
//! - [`Config`] - Project and global configuration

pub mod editor;
mod loader;
mod catalog;
mod config;
mod project;

pub use editor::{
    get_comments_above_step, remove_steps_from_dag_file, write_to_dag_file, Indentation,
};
pub use loader::{DagLoader, LoadedDag, LoaderError};
pub use catalog::{CatalogError, CheckReport, StepCatalog};
pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use project::{Project, ProjectError};
