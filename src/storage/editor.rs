//! Comment-preserving editor for DAG files
//!
//! DAG files are a restricted YAML dialect:
//!
//! ```text
//! steps:
//!   # Comment for the step below.
//!   data://meadow/x/2024-01-01/y:
//!     - snapshot://x/2024-01-01/y.csv
//!
//! include:
//!   - dag/other.yml
//! ```
//!
//! Going through a YAML serializer would drop every comment and reflow the
//! file, so edits are made line by line instead. Lines that an edit does not
//! touch are written back byte for byte.
//!
//! Every operation comes in two layers: a pure text transformation
//! ([`comments_above_step`], [`apply_dag_part`], [`remove_steps`]) and a file
//! wrapper that reads the whole file, transforms it and rewrites it
//! ([`get_comments_above_step`], [`write_to_dag_file`],
//! [`remove_steps_from_dag_file`]).

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::DagPart;

/// Indentation of lines written by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Indentation {
    /// Spaces before a step header
    pub step: usize,
    /// Spaces before a `- dependency` line
    pub dependency: usize,
}

impl Default for Indentation {
    fn default() -> Self {
        Self {
            step: 2,
            dependency: 4,
        }
    }
}

impl Indentation {
    fn step_line(&self, step: &str) -> String {
        format!("{}{}:\n", " ".repeat(self.step), step)
    }

    fn dependency_line(&self, dependency: &str) -> String {
        format!("{}- {}\n", " ".repeat(self.dependency), dependency)
    }

    fn comment_line(&self, comment: &str) -> String {
        if comment.trim().is_empty() {
            "\n".to_string()
        } else {
            format!("{}{}\n", " ".repeat(self.step), comment)
        }
    }
}

// =============================================================================
// Line classification
// =============================================================================

/// Number of leading whitespace characters
fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_dependency(line: &str) -> bool {
    line.trim_start().starts_with('-')
}

/// Returns the key of a `name:` line, ignoring dependencies and comments
fn header_name(line: &str) -> Option<&str> {
    let stripped = line.trim();
    if stripped.starts_with('-') || stripped.starts_with('#') {
        return None;
    }
    stripped.strip_suffix(':').map(str::trim_end)
}

/// Returns the step name of a step header (any key other than `steps:`)
fn step_header(line: &str) -> Option<&str> {
    header_name(line).filter(|name| *name != "steps")
}

/// Splits a file into its `steps` part and its `include` trailer
///
/// The trailer starts at the first line whose stripped form begins with
/// `include`.
fn split_sections(text: &str) -> (Vec<&str>, Vec<&str>) {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let boundary = lines
        .iter()
        .position(|line| line.trim().starts_with("include"))
        .unwrap_or(lines.len());
    let include = lines[boundary..].to_vec();
    let mut steps = lines;
    steps.truncate(boundary);
    (steps, include)
}

/// Appends a line, terminating the previous one if it lacked a newline
fn push_line(output: &mut Vec<String>, line: impl Into<String>) {
    if let Some(last) = output.last_mut() {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }
    output.push(line.into());
}

/// Re-attaches the include trailer with exactly one blank line before it
fn attach_include_section(output: &mut Vec<String>, include: &[&str]) {
    if include.is_empty() {
        return;
    }

    while output.last().is_some_and(|line| is_blank(line)) {
        output.pop();
    }

    push_line(output, "\n");
    for line in include {
        push_line(output, *line);
    }
}

// =============================================================================
// Comments above a step
// =============================================================================

/// Returns the comment lines directly above a step header
///
/// Comment lines are returned stripped, newline-joined, with a trailing
/// newline (or `""` if the step has no comment). Returns `None` if the step
/// is not defined in the text.
pub fn comments_above_step(text: &str, step: &str) -> Option<String> {
    let mut header_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let stripped = line.trim();

        if is_dependency(line) {
            header_lines.clear();
            continue;
        }

        if let Some(name) = header_name(line) {
            if name == step {
                if header_lines.is_empty() {
                    return Some(String::new());
                }
                return Some(format!("{}\n", header_lines.join("\n")));
            }
            header_lines.clear();
            continue;
        }

        if !stripped.is_empty() {
            header_lines.push(stripped);
        }
    }

    None
}

/// Reads a DAG file and returns the comment lines above a step
///
/// A step that is not in the file is not an error: it is logged and an empty
/// string is returned.
pub fn get_comments_above_step(step: &str, dag_file: &Path) -> Result<String> {
    let text = read_dag_file(dag_file)?;

    match comments_above_step(&text, step) {
        Some(comments) => Ok(comments),
        None => {
            tracing::error!(
                step,
                file = %dag_file.display(),
                "Step not found in DAG file"
            );
            Ok(String::new())
        }
    }
}

// =============================================================================
// Upserting steps
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Copying lines through
    Scanning,
    /// Dropping the old dependency and comment lines of a step being
    /// rewritten, up to the next step header
    ReplacingDependencies,
}

/// Line-by-line pass over the `steps` part of a DAG file
struct WritePass<'a> {
    dag_part: &'a DagPart,
    indentation: Indentation,
    state: WriteState,
    output: Vec<String>,
    /// Comment and blank lines that may belong to the next step header
    pending: Vec<&'a str>,
    steps_found: HashSet<&'a str>,
}

impl<'a> WritePass<'a> {
    fn new(dag_part: &'a DagPart, indentation: Indentation) -> Self {
        Self {
            dag_part,
            indentation,
            state: WriteState::Scanning,
            output: Vec::new(),
            pending: Vec::new(),
            steps_found: HashSet::new(),
        }
    }

    fn flush_pending(&mut self) {
        for line in std::mem::take(&mut self.pending) {
            push_line(&mut self.output, line);
        }
    }

    /// Drops the comment and blank lines above a step being rewritten
    fn discard_pending(&mut self) {
        self.pending.clear();
    }

    fn feed(&mut self, line: &'a str) {
        let dag_part = self.dag_part;

        if let Some(name) = step_header(line) {
            match dag_part.get(name) {
                Some(dependencies) => {
                    self.discard_pending();
                    push_line(&mut self.output, line);
                    for dep in dependencies {
                        push_line(&mut self.output, self.indentation.dependency_line(dep));
                    }
                    self.steps_found.insert(name);
                    self.state = WriteState::ReplacingDependencies;
                }
                None => {
                    self.flush_pending();
                    push_line(&mut self.output, line);
                    self.state = WriteState::Scanning;
                }
            }
            return;
        }

        if self.state == WriteState::ReplacingDependencies {
            // Comments are dropped whatever their indentation.
            if is_dependency(line) || is_comment(line) {
                return;
            }
            if !is_blank(line) {
                self.state = WriteState::Scanning;
            }
        }

        if is_blank(line) || is_comment(line) {
            self.pending.push(line);
        } else {
            self.flush_pending();
            push_line(&mut self.output, line);
        }
    }

    /// Emits the trailing comments and appends steps that were not found
    fn finish(mut self, comments: &HashMap<String, String>) -> Vec<String> {
        self.flush_pending();

        let dag_part = self.dag_part;
        let new_steps: Vec<(&str, &[String])> = dag_part
            .iter()
            .filter(|(step, _)| !self.steps_found.contains(step))
            .collect();

        if new_steps.is_empty() {
            return self.output;
        }

        let mut trailing_blanks = Vec::new();
        while self.output.last().is_some_and(|line| is_blank(line)) {
            trailing_blanks.extend(self.output.pop());
        }

        if !self.output.iter().any(|line| line.trim() == "steps:") {
            push_line(&mut self.output, "steps:\n");
        }

        for (step, dependencies) in new_steps {
            tracing::debug!(step, "Appending new step");
            if let Some(comment) = comments.get(step) {
                for comment_line in normalize_comment(comment).lines() {
                    push_line(&mut self.output, self.indentation.comment_line(comment_line));
                }
            }
            push_line(&mut self.output, self.indentation.step_line(step));
            for dep in dependencies {
                push_line(&mut self.output, self.indentation.dependency_line(dep));
            }
        }

        while let Some(blank) = trailing_blanks.pop() {
            push_line(&mut self.output, blank);
        }

        self.output
    }
}

/// Ensures a comment block ends with exactly one newline character
fn normalize_comment(comment: &str) -> String {
    if comment.ends_with('\n') {
        comment.to_string()
    } else {
        format!("{}\n", comment)
    }
}

/// Upserts steps into DAG text
///
/// Steps of `dag_part` that already exist keep their header and position;
/// only their dependency lines are replaced. Comments above such a step are
/// dropped. Steps that do not exist are appended at the end of the `steps`
/// section, each preceded by its entry in `comments` (if any).
pub fn apply_dag_part(
    text: &str,
    dag_part: &DagPart,
    comments: &HashMap<String, String>,
    indentation: Indentation,
) -> String {
    let (section_steps, section_include) = split_sections(text);

    let mut pass = WritePass::new(dag_part, indentation);
    for line in section_steps {
        pass.feed(line);
    }

    let mut output = pass.finish(comments);
    attach_include_section(&mut output, &section_include);
    output.concat()
}

/// Upserts steps into a DAG file
///
/// An empty `dag_part` leaves the file untouched.
pub fn write_to_dag_file(
    dag_file: &Path,
    dag_part: &DagPart,
    comments: &HashMap<String, String>,
    indentation: Indentation,
) -> Result<()> {
    if dag_part.is_empty() {
        return Ok(());
    }

    let text = read_dag_file(dag_file)?;
    let updated = apply_dag_part(&text, dag_part, comments, indentation);

    tracing::debug!(
        file = %dag_file.display(),
        steps = dag_part.len(),
        "Writing steps to DAG file"
    );
    write_dag_file(dag_file, &updated)
}

// =============================================================================
// Removing steps
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalState {
    /// Looking for the step; counts the comment/blank lines seen since the
    /// last content line
    BeforeMatch { pending_comments: usize },
    /// Dropping the lines of the removed step
    InsideRemovedBlock { indent: usize },
    /// Copying the rest of the file through
    AfterBlock,
}

impl RemovalState {
    fn next(self, line: &str, step: &str, output: &mut Vec<String>) -> RemovalState {
        match self {
            RemovalState::AfterBlock => {
                push_line(output, line);
                RemovalState::AfterBlock
            }

            RemovalState::BeforeMatch { pending_comments } => {
                if line.trim() == "steps:" {
                    push_line(output, line);
                    return RemovalState::BeforeMatch { pending_comments: 0 };
                }

                if is_blank(line) || is_comment(line) {
                    push_line(output, line);
                    return RemovalState::BeforeMatch {
                        pending_comments: pending_comments + 1,
                    };
                }

                if step_header(line) == Some(step) {
                    output.truncate(output.len() - pending_comments);
                    return RemovalState::InsideRemovedBlock {
                        indent: indent_of(line),
                    };
                }

                push_line(output, line);
                RemovalState::BeforeMatch { pending_comments: 0 }
            }

            RemovalState::InsideRemovedBlock { indent } => {
                let belongs_to_step = is_dependency(line)
                    || is_blank(line)
                    || (is_comment(line) && indent_of(line) > indent);

                if belongs_to_step {
                    RemovalState::InsideRemovedBlock { indent }
                } else {
                    push_line(output, line);
                    RemovalState::AfterBlock
                }
            }
        }
    }
}

/// Removes one step block, and the comments directly above it, from DAG text
///
/// Returns `None` if the step is not defined in the text.
pub fn remove_step(text: &str, step: &str) -> Option<String> {
    let mut output = Vec::new();
    let mut state = RemovalState::BeforeMatch { pending_comments: 0 };

    for line in text.split_inclusive('\n') {
        state = state.next(line, step, &mut output);
    }

    match state {
        RemovalState::BeforeMatch { .. } => None,
        RemovalState::InsideRemovedBlock { .. } => {
            // The removed block ran to the end of the file.
            while output.last().is_some_and(|line| is_blank(line)) {
                output.pop();
            }
            Some(output.concat())
        }
        RemovalState::AfterBlock => Some(output.concat()),
    }
}

/// Removes several steps from DAG text
///
/// Returns the new text and the steps that were actually removed.
pub fn remove_steps<S: AsRef<str>>(text: &str, steps: &[S]) -> (String, Vec<String>) {
    let mut current = text.to_string();
    let mut removed = Vec::new();

    for step in steps {
        let step = step.as_ref();
        match remove_step(&current, step) {
            Some(updated) => {
                current = updated;
                removed.push(step.to_string());
            }
            None => tracing::warn!(step, "Step not found, nothing to remove"),
        }
    }

    if removed.is_empty() {
        return (current, removed);
    }

    let (section_steps, section_include) = split_sections(&current);
    let mut output: Vec<String> = section_steps.into_iter().map(str::to_string).collect();
    attach_include_section(&mut output, &section_include);

    (output.concat(), removed)
}

/// Removes steps from a DAG file, returning the steps that were removed
pub fn remove_steps_from_dag_file<S: AsRef<str>>(
    dag_file: &Path,
    steps: &[S],
) -> Result<Vec<String>> {
    let text = read_dag_file(dag_file)?;
    let (updated, removed) = remove_steps(&text, steps);

    if !removed.is_empty() {
        tracing::debug!(
            file = %dag_file.display(),
            removed = removed.len(),
            "Removing steps from DAG file"
        );
        write_dag_file(dag_file, &updated)?;
    }

    Ok(removed)
}

// =============================================================================
// File I/O
// =============================================================================

fn read_dag_file(dag_file: &Path) -> Result<String> {
    fs::read_to_string(dag_file)
        .with_context(|| format!("Failed to read DAG file: {}", dag_file.display()))
}

fn temp_path(dag_file: &Path) -> PathBuf {
    let mut name = OsString::from(dag_file.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes a DAG file atomically (temp file + rename)
fn write_dag_file(dag_file: &Path, content: &str) -> Result<()> {
    let temp = temp_path(dag_file);

    fs::write(&temp, content)
        .with_context(|| format!("Failed to write temp file: {}", temp.display()))?;

    fs::rename(&temp, dag_file).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp.display(),
            dag_file.display()
        )
    })?;

    Ok(())
}
