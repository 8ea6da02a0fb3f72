//! Configuration handling for etl-dag
//!
//! Configuration is stored in `etl-dag.toml` at the project root and
//! `~/.config/etl-dag/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::editor::Indentation;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "etl-dag.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Entry point of the DAG (relative to the project root)
    pub dag_file: PathBuf,

    /// DAG file that archived steps are moved to
    pub archive_dag_file: PathBuf,

    /// Directory that `include:` paths are relative to
    pub base_dir: PathBuf,

    /// Indentation used when writing steps
    pub indent: Indentation,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            dag_file: PathBuf::from("dag/main.yml"),
            archive_dag_file: PathBuf::from("dag/archive/main.yml"),
            base_dir: PathBuf::from("."),
            indent: Indentation::default(),
        }
    }
}

impl ProjectConfig {
    /// Checks values that would produce unreadable DAG files
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent.dependency <= self.indent.step {
            return Err(ConfigError::Invalid(format!(
                "indent.dependency ({}) must be greater than indent.step ({})",
                self.indent.dependency, self.indent.step
            )));
        }
        if self.dag_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("dag_file must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
}

impl Config {
    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self { project, global })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "etl", "etl-dag").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;

        config
            .validate()
            .with_context(|| format!("Invalid project config: {}", config_path.display()))?;

        Ok(config)
    }

    /// Finds the project root by looking for `etl-dag.toml`
    pub fn find_project_root() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            if current.join(CONFIG_FILE).is_file() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
        };

        assert_eq!(config.project.dag_file, PathBuf::from("dag/main.yml"));
        assert_eq!(config.project.indent, Indentation::default());
        assert_eq!(config.global.default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
dag_file = "dag/active.yml"

[indent]
step = 4
dependency = 6
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.dag_file, PathBuf::from("dag/active.yml"));
        assert_eq!(config.archive_dag_file, PathBuf::from("dag/archive/main.yml"));
        assert_eq!(config.indent.step, 4);
        assert_eq!(config.indent.dependency, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_indent_uses_defaults() {
        let config: ProjectConfig = toml::from_str("[indent]\nstep = 1\n").unwrap();
        assert_eq!(config.indent.step, 1);
        assert_eq!(config.indent.dependency, 4);
    }

    #[test]
    fn invalid_indentation_is_rejected() {
        let config: ProjectConfig =
            toml::from_str("[indent]\nstep = 4\ndependency = 2\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn parse_global_config() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
    }

    #[test]
    fn load_project_config_from_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "dag_file = \"dag/x.yml\"\n").unwrap();

        let config = Config::for_project(dir.path()).unwrap();
        assert_eq!(config.project.dag_file, PathBuf::from("dag/x.yml"));
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_project(dir.path()).unwrap();
        assert_eq!(config.project.dag_file, PathBuf::from("dag/main.yml"));
    }

    #[test]
    fn invalid_project_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[indent]\nstep = 4\ndependency = 4\n").unwrap();
        assert!(Config::for_project(dir.path()).is_err());
    }
}
