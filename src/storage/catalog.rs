//! Step catalog
//!
//! A loaded DAG together with its dependency graph and the file each step is
//! defined in. Queries go through the in-memory view; edits are persisted
//! through the text editor into the file that owns the step, so comments and
//! layout of those files survive.
//!
//! Edits do not refresh the in-memory view. Load a new catalog to see them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use super::editor::{
    get_comments_above_step, remove_steps_from_dag_file, write_to_dag_file, Indentation,
};
use super::loader::{DagLoader, LoadedDag, LoaderError};
use crate::domain::{Dag, DagPart, DependencyGraph, GraphError, StepUri, StepUriError, StepVersion};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Step already exists: {0}")]
    StepExists(String),

    #[error("Step {step} is still used by: {}", .dependents.join(", "))]
    HasDependents {
        step: String,
        dependents: Vec<String>,
    },

    #[error(transparent)]
    Uri(#[from] StepUriError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result of checking a DAG for problems
#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    /// Groups of steps that depend on each other in a loop
    pub cycles: Vec<Vec<String>>,

    /// `(step, dependency)` pairs where the dependency is a data step that is
    /// not defined anywhere
    pub missing_dependencies: Vec<(String, String)>,
}

impl CheckReport {
    /// Returns true if no problem was found
    pub fn is_ok(&self) -> bool {
        self.cycles.is_empty() && self.missing_dependencies.is_empty()
    }
}

/// Registry of the steps of a DAG and the files defining them
pub struct StepCatalog {
    loaded: LoadedDag,
    graph: DependencyGraph,
    default_file: PathBuf,
    indentation: Indentation,
}

impl StepCatalog {
    /// Loads the DAG rooted at `dag_file`
    pub fn load(
        loader: &DagLoader,
        dag_file: &Path,
        indentation: Indentation,
    ) -> Result<Self, LoaderError> {
        let loaded = loader.load(dag_file)?;
        let default_file = loaded
            .files
            .first()
            .cloned()
            .unwrap_or_else(|| dag_file.to_path_buf());

        Ok(Self::from_loaded(loaded, default_file, indentation))
    }

    /// Builds a catalog from an already loaded DAG
    pub fn from_loaded(loaded: LoadedDag, default_file: PathBuf, indentation: Indentation) -> Self {
        let graph = DependencyGraph::from_dag(&loaded.dag);
        Self {
            loaded,
            graph,
            default_file,
            indentation,
        }
    }

    /// Returns the flattened DAG
    pub fn dag(&self) -> &Dag {
        &self.loaded.dag
    }

    /// Returns every file of the include closure, in load order
    pub fn files(&self) -> &[PathBuf] {
        &self.loaded.files
    }

    /// Returns the file new steps are written to by default
    pub fn default_file(&self) -> &Path {
        &self.default_file
    }

    /// Returns true if the step is defined
    pub fn contains(&self, step: &str) -> bool {
        self.loaded.dag.contains(step)
    }

    /// Returns the file that defines a step
    pub fn file_for_step(&self, step: &str) -> Option<&Path> {
        self.loaded.origin(step)
    }

    /// Returns the steps defined in a file
    pub fn steps_in_file(&self, file: &Path) -> Vec<&str> {
        self.loaded.steps_in_file(file)
    }

    fn require(&self, step: &str) -> Result<&Path, CatalogError> {
        self.file_for_step(step)
            .ok_or_else(|| CatalogError::StepNotFound(step.to_string()))
    }

    /// Returns the direct dependencies of a step
    pub fn dependencies(&self, step: &str) -> Result<Vec<String>, CatalogError> {
        self.require(step)?;
        Ok(self.graph.dependencies(step)?)
    }

    /// Returns the steps that directly depend on a step
    pub fn dependents(&self, step: &str) -> Result<Vec<String>, CatalogError> {
        if !self.graph.contains(step) {
            return Err(CatalogError::StepNotFound(step.to_string()));
        }
        Ok(self.graph.dependents(step)?)
    }

    /// Returns every step that depends on a step, directly or transitively
    pub fn all_dependents(&self, step: &str) -> Result<BTreeSet<String>, CatalogError> {
        if !self.graph.contains(step) {
            return Err(CatalogError::StepNotFound(step.to_string()));
        }
        Ok(self.graph.all_dependents(step)?)
    }

    /// Returns the defined steps in execution order
    pub fn execution_order(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .graph
            .topological_order()?
            .into_iter()
            .filter(|step| self.contains(step))
            .collect())
    }

    /// Returns the comment lines above a step in its file
    pub fn comment_for(&self, step: &str) -> Result<String> {
        let file = self.require(step)?;
        get_comments_above_step(step, file)
    }

    /// Returns all defined versions of a step, oldest first
    pub fn versions_of(&self, step: &str) -> Result<Vec<String>, CatalogError> {
        let identity = step.parse::<StepUri>()?.identity();

        let mut versions: Vec<(Option<StepVersion>, &String)> = self
            .loaded
            .dag
            .steps()
            .filter_map(|name| {
                let uri = name.parse::<StepUri>().ok()?;
                (uri.identity() == identity).then(|| (uri.version(), name))
            })
            .collect();
        versions.sort();

        Ok(versions.into_iter().map(|(_, name)| name.clone()).collect())
    }

    /// Returns the newest defined version of a step
    pub fn latest_version_of(&self, step: &str) -> Result<String, CatalogError> {
        self.versions_of(step)?
            .pop()
            .ok_or_else(|| CatalogError::StepNotFound(step.to_string()))
    }

    /// Adds a step, or replaces the dependencies of an existing one
    ///
    /// Existing steps are rewritten in the file that defines them. New steps
    /// go to `file`, or to the default file. Returns the file written.
    pub fn add_step(
        &self,
        step: &str,
        dependencies: &[String],
        comment: Option<&str>,
        file: Option<&Path>,
    ) -> Result<PathBuf> {
        let target = match self.file_for_step(step) {
            Some(origin) => origin.to_path_buf(),
            None => file.unwrap_or(self.default_file.as_path()).to_path_buf(),
        };

        let mut dag_part = DagPart::new();
        dag_part.insert(step, dependencies.iter().cloned());

        let mut comments = HashMap::new();
        if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
            comments.insert(step.to_string(), comment.to_string());
        }

        tracing::info!(step, file = %target.display(), "Writing step");
        write_to_dag_file(&target, &dag_part, &comments, self.indentation)?;
        Ok(target)
    }

    /// Creates a new version of a step next to the old one
    ///
    /// Dependencies are moved to their latest defined versions and the
    /// comment above the old step is copied. Returns the new step name.
    pub fn update_step(&self, step: &str, version: &StepVersion) -> Result<String> {
        let file = self.require(step)?.to_path_buf();
        let new_step = step.parse::<StepUri>()?.with_version(version)?.to_string();

        if self.contains(&new_step) {
            return Err(CatalogError::StepExists(new_step).into());
        }

        let dependencies: Vec<String> = self
            .loaded
            .dag
            .dependencies(step)
            .into_iter()
            .flatten()
            .map(|dep| self.latest_version_of(dep).unwrap_or_else(|_| dep.clone()))
            .collect();

        let comment = get_comments_above_step(step, &file)?;

        let mut dag_part = DagPart::new();
        dag_part.insert(new_step.as_str(), dependencies);

        let mut comments = HashMap::new();
        if !comment.is_empty() {
            comments.insert(new_step.clone(), comment);
        }

        tracing::info!(step, new_step = %new_step, file = %file.display(), "Updating step");
        write_to_dag_file(&file, &dag_part, &comments, self.indentation)?;
        Ok(new_step)
    }

    /// Checks that steps exist and that nothing outside the set depends on them
    fn check_removable(&self, steps: &[String]) -> Result<(), CatalogError> {
        let removing: BTreeSet<&str> = steps.iter().map(String::as_str).collect();

        for step in steps {
            self.require(step)?;
            let dependents: Vec<String> = self
                .graph
                .dependents(step)?
                .into_iter()
                .filter(|d| !removing.contains(d.as_str()))
                .collect();

            if !dependents.is_empty() {
                return Err(CatalogError::HasDependents {
                    step: step.clone(),
                    dependents,
                });
            }
        }

        Ok(())
    }

    fn group_by_file(&self, steps: &[String]) -> BTreeMap<PathBuf, Vec<String>> {
        let mut groups: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for step in steps {
            if let Some(file) = self.file_for_step(step) {
                groups.entry(file.to_path_buf()).or_default().push(step.clone());
            }
        }
        groups
    }

    /// Removes steps from the files that define them
    ///
    /// Refuses to remove a step that is still used by a step outside `steps`.
    pub fn remove_steps(&self, steps: &[String]) -> Result<Vec<String>> {
        self.check_removable(steps)?;

        let mut removed = Vec::new();
        for (file, file_steps) in self.group_by_file(steps) {
            tracing::info!(file = %file.display(), steps = ?file_steps, "Removing steps");
            removed.extend(remove_steps_from_dag_file(&file, &file_steps)?);
        }
        Ok(removed)
    }

    /// Moves steps (with their comments) to an archive DAG file
    pub fn archive_steps(&self, steps: &[String], archive_file: &Path) -> Result<Vec<String>> {
        self.check_removable(steps)?;

        let mut dag_part = DagPart::new();
        let mut comments = HashMap::new();
        for step in steps {
            let dependencies = self.loaded.dag.dependencies(step).into_iter().flatten().cloned();
            dag_part.insert(step.as_str(), dependencies);

            let comment = self.comment_for(step)?;
            if !comment.is_empty() {
                comments.insert(step.clone(), comment);
            }
        }

        tracing::info!(archive = %archive_file.display(), steps = steps.len(), "Archiving steps");
        write_to_dag_file(archive_file, &dag_part, &comments, self.indentation)?;

        self.remove_steps(steps)
    }

    /// Looks for dependency cycles and undefined data dependencies
    pub fn check(&self) -> CheckReport {
        let mut missing_dependencies = Vec::new();

        for (step, deps) in self.loaded.dag.iter() {
            for dep in deps {
                let is_data_step = dep
                    .parse::<StepUri>()
                    .map(|uri| uri.is_data_step())
                    .unwrap_or(false);

                if is_data_step && !self.contains(dep) {
                    missing_dependencies.push((step.clone(), dep.clone()));
                }
            }
        }

        CheckReport {
            cycles: self.graph.cycles(),
            missing_dependencies,
        }
    }
}
