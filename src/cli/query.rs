//! Query commands (list, show, comments, order, check)
//!
//! These commands only read the DAG files.

use std::path::Path;

use anyhow::{bail, Result};

use super::output::Output;
use crate::storage::{Project, StepCatalog};

/// Opens the current project and loads its DAG
pub(super) fn open(dag: Option<&Path>) -> Result<(Project, StepCatalog)> {
    let project = Project::open_current()?;
    tracing::debug!(root = %project.root().display(), "Opened project");

    let catalog = project.catalog(dag)?;
    tracing::debug!(
        steps = catalog.dag().len(),
        files = catalog.files().len(),
        "Loaded DAG"
    );

    Ok((project, catalog))
}

/// Formats a path relative to the project root when possible
pub(super) fn relative(project: &Project, path: &Path) -> String {
    path.strip_prefix(project.root())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// List steps, optionally only those of one file
pub fn list(output: &Output, dag: Option<&Path>, file: Option<&Path>) -> Result<()> {
    let (project, catalog) = open(dag)?;

    let steps: Vec<&str> = match file {
        Some(file) => catalog.steps_in_file(&project.root().join(file)),
        None => catalog.dag().steps().map(String::as_str).collect(),
    };

    if output.is_json() {
        let items: Vec<_> = steps
            .iter()
            .map(|step| {
                serde_json::json!({
                    "step": step,
                    "file": catalog.file_for_step(step).map(|f| relative(&project, f)),
                    "dependencies": catalog.dag().dependencies(step),
                })
            })
            .collect();
        output.data(&items);
    } else if steps.is_empty() {
        println!("No steps found.");
    } else {
        println!("{:<60} FILE", "STEP");
        println!("{}", "-".repeat(80));
        for step in &steps {
            let file = catalog
                .file_for_step(step)
                .map(|f| relative(&project, f))
                .unwrap_or_default();
            println!("{:<60} {}", step, file);
        }
        println!();
        println!("{} step(s)", steps.len());
    }

    Ok(())
}

/// Show a step with its comment, dependencies, dependents and versions
pub fn show(output: &Output, dag: Option<&Path>, step: &str) -> Result<()> {
    let (project, catalog) = open(dag)?;

    let dependencies = catalog.dependencies(step)?;
    let dependents = catalog.dependents(step)?;
    let all_dependents = catalog.all_dependents(step)?;
    let comment = catalog.comment_for(step)?;
    let file = catalog
        .file_for_step(step)
        .map(|f| relative(&project, f))
        .unwrap_or_default();
    let versions = catalog.versions_of(step).unwrap_or_default();

    if output.is_json() {
        output.data(&serde_json::json!({
            "step": step,
            "file": file,
            "comment": comment,
            "dependencies": dependencies,
            "dependents": dependents,
            "all_dependents": all_dependents,
            "versions": versions,
        }));
        return Ok(());
    }

    println!("Step: {}", step);
    println!("File: {}", file);

    if !comment.is_empty() {
        println!();
        print!("{}", comment);
    }

    println!();
    println!("Dependencies ({}):", dependencies.len());
    for dep in &dependencies {
        println!("  - {}", dep);
    }

    println!();
    println!("Dependents ({}):", dependents.len());
    for dependent in &dependents {
        println!("  - {}", dependent);
    }

    if all_dependents.len() > dependents.len() {
        println!();
        println!("All dependents ({}):", all_dependents.len());
        for dependent in &all_dependents {
            println!("  - {}", dependent);
        }
    }

    if versions.len() > 1 {
        println!();
        println!("Versions ({}):", versions.len());
        for version in &versions {
            let marker = if version == step { "*" } else { " " };
            println!("  {} {}", marker, version);
        }
    }

    Ok(())
}

/// Print the comment lines above a step
pub fn comments(output: &Output, dag: Option<&Path>, step: &str) -> Result<()> {
    let (_, catalog) = open(dag)?;
    let comment = catalog.comment_for(step)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "step": step,
            "comment": comment,
        }));
    } else {
        print!("{}", comment);
    }

    Ok(())
}

/// Print steps in execution order
pub fn order(output: &Output, dag: Option<&Path>) -> Result<()> {
    let (_, catalog) = open(dag)?;
    let order = catalog.execution_order()?;

    if output.is_json() {
        output.data(&order);
    } else {
        for step in &order {
            println!("{}", step);
        }
    }

    Ok(())
}

/// Check the DAG for cycles and undefined data dependencies
pub fn check(output: &Output, dag: Option<&Path>) -> Result<()> {
    let (_, catalog) = open(dag)?;
    let report = catalog.check();

    if output.is_json() {
        output.data(&report);
    } else if report.is_ok() {
        println!("DAG OK: {} step(s)", catalog.dag().len());
    } else {
        for cycle in &report.cycles {
            println!("Cycle: {}", cycle.join(" -> "));
        }
        for (step, dep) in &report.missing_dependencies {
            println!("Missing: {} (needed by {})", dep, step);
        }
    }

    if !report.is_ok() {
        bail!(
            "DAG check failed: {} cycle(s), {} missing dependenc(ies)",
            report.cycles.len(),
            report.missing_dependencies.len()
        );
    }

    Ok(())
}
