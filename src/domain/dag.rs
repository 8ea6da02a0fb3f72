//! Step → dependencies maps
//!
//! [`Dag`] is the loaded, flattened view of one or more DAG files.
//! [`DagPart`] is an edit request: an ordered set of steps with the dependency
//! lists they should end up with in a DAG file.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Flat mapping from step name to the set of its dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Dag {
    steps: BTreeMap<String, BTreeSet<String>>,
}

impl Dag {
    /// Creates an empty DAG
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a step
    pub fn insert<I, S>(&mut self, step: impl Into<String>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.insert(
            step.into(),
            dependencies.into_iter().map(Into::into).collect(),
        );
    }

    /// Returns the dependencies of a step, or None if it is not defined
    pub fn dependencies(&self, step: &str) -> Option<&BTreeSet<String>> {
        self.steps.get(step)
    }

    /// Returns true if the step is defined
    pub fn contains(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    /// Returns all step names in sorted order
    pub fn steps(&self) -> impl Iterator<Item = &String> {
        self.steps.keys()
    }

    /// Iterates over `(step, dependencies)` pairs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.steps.iter()
    }

    /// Returns the number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no steps are defined
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the steps defined in both DAGs
    pub fn overlap(&self, other: &Dag) -> BTreeSet<String> {
        self.steps
            .keys()
            .filter(|step| other.contains(step))
            .cloned()
            .collect()
    }

    /// Merges another DAG into this one (later definitions win)
    pub fn extend(&mut self, other: Dag) {
        self.steps.extend(other.steps);
    }
}

/// Ordered set of step definitions to upsert into a DAG file
///
/// Insertion order is kept: steps that do not exist yet are appended to the
/// file in the order they were inserted, and dependency lines are written in
/// the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagPart {
    entries: Vec<(String, Vec<String>)>,
}

impl DagPart {
    /// Creates an empty edit request
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dependencies of a step, keeping its original position if it
    /// was already present
    pub fn insert<I, S>(&mut self, step: impl Into<String>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let step = step.into();
        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();

        match self.entries.iter_mut().find(|(name, _)| *name == step) {
            Some(entry) => entry.1 = dependencies,
            None => self.entries.push((step, dependencies)),
        }
    }

    /// Returns the dependencies requested for a step
    pub fn get(&self, step: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, deps)| deps.as_slice())
    }

    /// Returns true if the step is part of this request
    pub fn contains(&self, step: &str) -> bool {
        self.get(step).is_some()
    }

    /// Iterates over `(step, dependencies)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, I, S> FromIterator<(K, I)> for DagPart
where
    K: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut part = DagPart::new();
        for (step, deps) in iter {
            part.insert(step, deps);
        }
        part
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_insert_and_query() {
        let mut dag = Dag::new();
        dag.insert("b", ["a"]);
        dag.insert("a", Vec::<String>::new());

        assert_eq!(dag.len(), 2);
        assert!(dag.contains("a"));
        assert!(dag.dependencies("a").unwrap().is_empty());
        assert!(dag.dependencies("b").unwrap().contains("a"));
        assert!(dag.dependencies("c").is_none());

        let steps: Vec<_> = dag.steps().cloned().collect();
        assert_eq!(steps, vec!["a", "b"]);
    }

    #[test]
    fn dag_overlap_and_extend() {
        let mut first = Dag::new();
        first.insert("a", ["x"]);
        first.insert("b", ["x"]);

        let mut second = Dag::new();
        second.insert("b", ["y"]);
        second.insert("c", ["y"]);

        let overlap = first.overlap(&second);
        assert_eq!(overlap.into_iter().collect::<Vec<_>>(), vec!["b"]);

        first.extend(second);
        assert_eq!(first.len(), 3);
        assert!(first.dependencies("b").unwrap().contains("y"));
    }

    #[test]
    fn dag_part_keeps_insertion_order() {
        let part: DagPart = [("z", vec!["a"]), ("m", vec!["b", "a"])].into_iter().collect();

        let order: Vec<_> = part.iter().map(|(step, _)| step).collect();
        assert_eq!(order, vec!["z", "m"]);
        assert_eq!(part.get("m").unwrap(), ["b", "a"]);
    }

    #[test]
    fn dag_part_insert_replaces_in_place() {
        let mut part = DagPart::new();
        part.insert("a", ["x"]);
        part.insert("b", ["y"]);
        part.insert("a", ["z"]);

        assert_eq!(part.len(), 2);
        let order: Vec<_> = part.iter().map(|(step, _)| step).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(part.get("a").unwrap(), ["z"]);
    }

    #[test]
    fn dag_serializes_as_map() {
        let mut dag = Dag::new();
        dag.insert("b", ["a"]);
        let json = serde_json::to_value(&dag).unwrap();
        assert_eq!(json, serde_json::json!({"b": ["a"]}));
    }
}
