//! DAG loading
//!
//! Parses DAG files with serde_yaml and follows their `include:` entries,
//! producing one flat step → dependencies map. Include paths are resolved
//! against a base directory (the project root).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::Dag;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read DAG file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse DAG file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Duplicate steps found in {}: {}", .path.display(), .steps.iter().cloned().collect::<Vec<_>>().join(", "))]
    DuplicateSteps {
        path: PathBuf,
        steps: BTreeSet<String>,
    },

    #[error("Include cycle detected: {} is already being loaded", .0.display())]
    IncludeCycle(PathBuf),
}

/// Raw content of a DAG file
#[derive(Debug, Default, Deserialize)]
struct DagYaml {
    #[serde(default)]
    steps: Option<BTreeMap<String, Option<Vec<String>>>>,

    #[serde(default)]
    include: Option<Vec<String>>,
}

impl DagYaml {
    fn into_dag(self) -> (Dag, Vec<String>) {
        let mut dag = Dag::new();
        for (step, deps) in self.steps.unwrap_or_default() {
            dag.insert(step, deps.unwrap_or_default());
        }
        (dag, self.include.unwrap_or_default())
    }
}

/// A DAG loaded from a file and everything it includes
#[derive(Debug, Default)]
pub struct LoadedDag {
    /// All steps, flattened
    pub dag: Dag,

    /// The file that defines each step
    pub origins: HashMap<String, PathBuf>,

    /// Every file read, in load order
    pub files: Vec<PathBuf>,
}

impl LoadedDag {
    /// Returns the file that defines a step
    pub fn origin(&self, step: &str) -> Option<&Path> {
        self.origins.get(step).map(PathBuf::as_path)
    }

    /// Returns the steps defined in a given file, sorted
    pub fn steps_in_file(&self, file: &Path) -> Vec<&str> {
        let mut steps: Vec<&str> = self
            .origins
            .iter()
            .filter(|(_, origin)| origin.as_path() == file)
            .map(|(step, _)| step.as_str())
            .collect();
        steps.sort();
        steps
    }
}

/// Loads DAG files, following `include:` entries
pub struct DagLoader {
    base_dir: PathBuf,
}

impl DagLoader {
    /// Creates a loader resolving include paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the directory include paths are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Loads a single file, ignoring its includes
    pub fn load_file(&self, path: &Path) -> Result<Dag, LoaderError> {
        let path = self.resolve(path);
        let (dag, _) = parse_dag_file(&path)?.into_dag();
        Ok(dag)
    }

    /// Loads a DAG file and, recursively, all the files it includes
    ///
    /// A step defined in more than one file of the include closure is an
    /// error.
    pub fn load(&self, path: &Path) -> Result<LoadedDag, LoaderError> {
        let mut loaded = LoadedDag::default();
        let mut stack = Vec::new();
        self.load_into(&self.resolve(path), &mut loaded, &mut stack)?;
        tracing::debug!(
            steps = loaded.dag.len(),
            files = loaded.files.len(),
            "Loaded DAG"
        );
        Ok(loaded)
    }

    fn load_into(
        &self,
        path: &Path,
        loaded: &mut LoadedDag,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), LoaderError> {
        if stack.iter().any(|p| p == path) {
            return Err(LoaderError::IncludeCycle(path.to_path_buf()));
        }

        let (dag, includes) = parse_dag_file(path)?.into_dag();

        let duplicates = loaded.dag.overlap(&dag);
        if !duplicates.is_empty() {
            return Err(LoaderError::DuplicateSteps {
                path: path.to_path_buf(),
                steps: duplicates,
            });
        }

        for step in dag.steps() {
            loaded.origins.insert(step.clone(), path.to_path_buf());
        }
        loaded.dag.extend(dag);
        loaded.files.push(path.to_path_buf());

        stack.push(path.to_path_buf());
        for include in includes {
            let include_path = self.resolve(Path::new(&include));
            tracing::debug!(
                from = %path.display(),
                include = %include_path.display(),
                "Following include"
            );
            self.load_into(&include_path, loaded, stack)?;
        }
        stack.pop();

        Ok(())
    }
}

fn parse_dag_file(path: &Path) -> Result<DagYaml, LoaderError> {
    let content = fs::read_to_string(path).map_err(|source| LoaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(DagYaml::default());
    }

    serde_yaml::from_str(&content).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_single_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "dag/main.yml",
            "\
steps:
  # A comment.
  data://meadow/x/2024-01-01/y:
    - snapshot://x/2024-01-01/y.csv
  data://garden/x/2024-01-01/y:
    - data://meadow/x/2024-01-01/y
  data://garden/x/2024-01-01/z:
",
        );

        let loader = DagLoader::new(dir.path());
        let loaded = loader.load(Path::new("dag/main.yml")).unwrap();

        assert_eq!(loaded.dag.len(), 3);
        assert!(loaded
            .dag
            .dependencies("data://garden/x/2024-01-01/y")
            .unwrap()
            .contains("data://meadow/x/2024-01-01/y"));
        assert!(loaded
            .dag
            .dependencies("data://garden/x/2024-01-01/z")
            .unwrap()
            .is_empty());
        assert_eq!(loaded.files.len(), 1);
    }

    #[test]
    fn load_follows_includes() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "dag/main.yml",
            "steps:\n  a:\n    - b\n\ninclude:\n  - dag/sub.yml\n",
        );
        let sub = write(&dir, "dag/sub.yml", "steps:\n  b:\n    - c\n");

        let loader = DagLoader::new(dir.path());
        let loaded = loader.load(Path::new("dag/main.yml")).unwrap();

        assert_eq!(loaded.dag.len(), 2);
        assert_eq!(loaded.origin("b"), Some(sub.as_path()));
        assert_eq!(loaded.steps_in_file(&sub), vec!["b"]);
        assert_eq!(loaded.files.len(), 2);
    }

    #[test]
    fn duplicate_steps_across_includes_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "main.yml",
            "steps:\n  a:\n\ninclude:\n  - sub.yml\n",
        );
        write(&dir, "sub.yml", "steps:\n  a:\n    - b\n");

        let loader = DagLoader::new(dir.path());
        let err = loader.load(Path::new("main.yml")).unwrap_err();

        match err {
            LoaderError::DuplicateSteps { steps, .. } => {
                assert_eq!(steps.into_iter().collect::<Vec<_>>(), vec!["a"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn include_cycle_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yml", "steps:\n  a:\n\ninclude:\n  - b.yml\n");
        write(&dir, "b.yml", "steps:\n  b:\n\ninclude:\n  - a.yml\n");

        let loader = DagLoader::new(dir.path());
        let err = loader.load(Path::new("a.yml")).unwrap_err();
        assert!(matches!(err, LoaderError::IncludeCycle(_)));
    }

    #[test]
    fn empty_steps_section() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.yml", "steps:\n");
        write(&dir, "empty.yml", "");

        let loader = DagLoader::new(dir.path());
        assert!(loader.load(Path::new("main.yml")).unwrap().dag.is_empty());
        assert!(loader.load(Path::new("empty.yml")).unwrap().dag.is_empty());
    }

    #[test]
    fn load_file_ignores_includes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.yml", "steps:\n  a:\n\ninclude:\n  - missing.yml\n");

        let loader = DagLoader::new(dir.path());
        let dag = loader.load_file(Path::new("main.yml")).unwrap();
        assert!(dag.contains("a"));
        assert!(matches!(
            loader.load(Path::new("main.yml")),
            Err(LoaderError::Read { .. })
        ));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.yml", "steps:\n  - a\n  - b\n");

        let loader = DagLoader::new(dir.path());
        assert!(matches!(
            loader.load(Path::new("main.yml")),
            Err(LoaderError::Parse { .. })
        ));
    }
}
