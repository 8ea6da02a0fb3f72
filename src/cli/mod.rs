//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Query | Read the DAG | `list`, `show`, `comments`, `order`, `check` |
//! | Edit | Rewrite DAG files | `add`, `remove`, `update`, `archive` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. Use `--verbose` (or `-v`) for debug logs, or set
//! `RUST_LOG` for finer control:
//! ```bash
//! RUST_LOG=etl_dag::storage=debug etl-dag remove data://garden/x/2024-01-01/y
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod query;
mod edit;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
