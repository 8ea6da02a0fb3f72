//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{edit, query};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "etl-dag")]
#[command(author, version, about = "Comment-preserving editor for ETL DAG files")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// DAG file to start from instead of the configured one
    #[arg(long, global = true, env = "ETL_DAG_FILE")]
    pub dag: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new etl-dag project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List steps
    List {
        /// Only list steps defined in this file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show a step: its file, comment, dependencies and versions
    Show {
        /// Step URI
        step: String,
    },

    /// Print the comment lines above a step
    Comments {
        /// Step URI
        step: String,
    },

    /// Add a step, or replace the dependencies of an existing one
    ///
    /// Examples:
    ///   etl-dag add data://garden/un/2024-01-01/population \
    ///       --dep data://meadow/un/2024-01-01/population
    Add {
        /// Step URI
        step: String,

        /// Dependency (repeatable, order is kept)
        #[arg(long = "dep", short = 'd')]
        dependencies: Vec<String>,

        /// Comment written above a new step
        #[arg(long, short = 'c')]
        comment: Option<String>,

        /// File for a new step (defaults to the DAG file)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Remove steps from the files that define them
    Remove {
        /// Step URIs
        #[arg(required = true)]
        steps: Vec<String>,
    },

    /// Create a new version of a step, with dependencies on their latest versions
    #[command(disable_version_flag = true)]
    Update {
        /// Step URI
        step: String,

        /// New version (defaults to today's date)
        #[arg(long)]
        version: Option<String>,
    },

    /// Move steps to the archive DAG file
    Archive {
        /// Step URIs
        #[arg(required = true)]
        steps: Vec<String>,
    },

    /// Print steps in execution order
    Order,

    /// Check the DAG for cycles and undefined dependencies
    Check,
}

/// Installs the stderr log subscriber
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug and the
/// default is warn.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be set when running inside tests.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format,
    };
    let output = Output::new(format);
    let dag = cli.dag.as_deref();

    tracing::debug!("etl-dag starting");

    match cli.command {
        Commands::Init { path } => {
            let project = Project::init(&path)?;
            tracing::debug!(dag_file = %project.dag_file().display(), "Project initialized");
            output.success(&format!(
                "Initialized etl-dag project at {}",
                project.root().display()
            ));
        }

        Commands::List { file } => query::list(&output, dag, file.as_deref())?,
        Commands::Show { step } => query::show(&output, dag, &step)?,
        Commands::Comments { step } => query::comments(&output, dag, &step)?,
        Commands::Order => query::order(&output, dag)?,
        Commands::Check => query::check(&output, dag)?,

        Commands::Add {
            step,
            dependencies,
            comment,
            file,
        } => edit::add(
            &output,
            dag,
            &step,
            &dependencies,
            comment.as_deref(),
            file.as_deref(),
        )?,
        Commands::Remove { steps } => edit::remove(&output, dag, &steps)?,
        Commands::Update { step, version } => {
            edit::update(&output, dag, &step, version.as_deref())?
        }
        Commands::Archive { steps } => edit::archive(&output, dag, &steps)?,
    }

    tracing::debug!("Command completed successfully");
    Ok(())
}
