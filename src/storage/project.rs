//! Project management
//!
//! Handles project initialization and resolves the DAG files a project uses.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::catalog::StepCatalog;
use super::config::{Config, CONFIG_FILE};
use super::loader::DagLoader;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in an etl-dag project. Run 'etl-dag init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# etl-dag configuration

# Entry point of the DAG, relative to this file
dag_file = "dag/main.yml"

# Where 'etl-dag archive' moves steps to
archive_dag_file = "dag/archive/main.yml"

# Directory that 'include:' paths are relative to
base_dir = "."

[indent]
step = 2
dependency = 4
"#;

/// An etl-dag project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(CONFIG_FILE).is_file() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left untouched, so running it twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create directory: {}", root.display()))?;

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let project = Self::open(root)?;
        for dag_file in [project.dag_file(), project.archive_dag_file()] {
            ensure_dag_file(&dag_file)?;
        }

        Ok(project)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the main DAG file
    pub fn dag_file(&self) -> PathBuf {
        self.root.join(&self.config.project.dag_file)
    }

    /// Returns the archive DAG file
    pub fn archive_dag_file(&self) -> PathBuf {
        self.root.join(&self.config.project.archive_dag_file)
    }

    /// Returns the directory `include:` paths are resolved against
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(&self.config.project.base_dir)
    }

    /// Returns a loader for this project's DAG files
    pub fn loader(&self) -> DagLoader {
        DagLoader::new(self.base_dir())
    }

    /// Returns the archive DAG file, creating an empty one if needed
    pub fn ensure_archive_dag_file(&self) -> Result<PathBuf> {
        let path = self.archive_dag_file();
        ensure_dag_file(&path)?;
        Ok(path)
    }

    /// Loads the DAG starting at `dag_file` (or the configured one)
    pub fn catalog(&self, dag_file: Option<&Path>) -> Result<StepCatalog> {
        let dag_file = match dag_file {
            Some(path) => self.root.join(path),
            None => self.dag_file(),
        };

        StepCatalog::load(&self.loader(), &dag_file, self.config.project.indent)
            .with_context(|| format!("Failed to load DAG: {}", dag_file.display()))
    }
}

/// Creates a DAG file with an empty `steps:` section unless it exists
fn ensure_dag_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, "steps:\n")
        .with_context(|| format!("Failed to write DAG file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).is_file());
        assert_eq!(fs::read_to_string(project.dag_file()).unwrap(), "steps:\n");
        assert!(project.archive_dag_file().is_file());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();
        fs::write(project.dag_file(), "steps:\n  a:\n").unwrap();

        let project = Project::init(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(project.dag_file()).unwrap(), "steps:\n  a:\n");
    }

    #[test]
    fn open_without_config_fails() {
        let dir = TempDir::new().unwrap();
        let err = Project::open(dir.path()).err().unwrap();
        assert!(err.downcast_ref::<ProjectError>().is_some());
    }

    #[test]
    fn paths_follow_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "dag_file = \"custom/dag.yml\"\nbase_dir = \"custom\"\n",
        )
        .unwrap();

        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.dag_file(), dir.path().join("custom/dag.yml"));
        assert_eq!(project.base_dir(), dir.path().join("custom"));
    }

    #[test]
    fn archive_file_is_recreated() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();
        fs::remove_file(project.archive_dag_file()).unwrap();

        let path = project.ensure_archive_dag_file().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "steps:\n");
    }

    #[test]
    fn catalog_loads_main_dag() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();
        fs::write(project.dag_file(), "steps:\n  a:\n    - b\n").unwrap();

        let catalog = project.catalog(None).unwrap();
        assert!(catalog.contains("a"));
    }
}
