//! Edit commands (add, remove, update, archive)
//!
//! Every edit goes through the comment-preserving editor and rewrites only
//! the files that own the affected steps.

use std::path::Path;

use anyhow::Result;
use chrono::Local;

use super::output::Output;
use super::query::{open, relative};
use crate::domain::StepVersion;

/// Add a step or replace its dependencies
pub fn add(
    output: &Output,
    dag: Option<&Path>,
    step: &str,
    dependencies: &[String],
    comment: Option<&str>,
    file: Option<&Path>,
) -> Result<()> {
    let (project, catalog) = open(dag)?;
    let existed = catalog.contains(step);

    let file = file.map(|f| project.root().join(f));
    let written = catalog.add_step(step, dependencies, comment, file.as_deref())?;
    let written = relative(&project, &written);

    if output.is_json() {
        output.data(&serde_json::json!({
            "step": step,
            "file": written,
            "created": !existed,
            "dependencies": dependencies,
        }));
    } else if existed {
        output.success(&format!("Updated dependencies of {} in {}", step, written));
    } else {
        output.success(&format!("Added {} to {}", step, written));
    }

    Ok(())
}

/// Remove steps
pub fn remove(output: &Output, dag: Option<&Path>, steps: &[String]) -> Result<()> {
    let (_, catalog) = open(dag)?;
    let removed = catalog.remove_steps(steps)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "removed": removed }));
    } else {
        for step in &removed {
            println!("Removed {}", step);
        }
    }

    Ok(())
}

/// Create a new version of a step
pub fn update(
    output: &Output,
    dag: Option<&Path>,
    step: &str,
    version: Option<&str>,
) -> Result<()> {
    let (_, catalog) = open(dag)?;

    let version = match version {
        Some(version) => version.parse::<StepVersion>()?,
        None => StepVersion::dated(Local::now().date_naive()),
    };

    let new_step = catalog.update_step(step, &version)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "step": step,
            "new_step": new_step,
        }));
    } else {
        output.success(&format!("Created {}", new_step));
    }

    Ok(())
}

/// Move steps to the archive DAG file
pub fn archive(output: &Output, dag: Option<&Path>, steps: &[String]) -> Result<()> {
    let (project, catalog) = open(dag)?;
    let archive_file = project.ensure_archive_dag_file()?;

    let archived = catalog.archive_steps(steps, &archive_file)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "archived": archived,
            "archive_file": relative(&project, &archive_file),
        }));
    } else {
        output.success(&format!(
            "Archived {} step(s) to {}",
            archived.len(),
            relative(&project, &archive_file)
        ));
    }

    Ok(())
}
