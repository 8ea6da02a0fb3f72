//! Dependency graph for steps
//!
//! Computes execution order, dependents and cycles over a loaded [`Dag`].
//! Uses petgraph for graph operations.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use super::dag::Dag;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Dependency cycle detected involving: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Step not found: {0}")]
    StepNotFound(String),
}

/// A dependency graph over step names
///
/// Edges point from a dependency to the step that depends on it, so a
/// topological sort yields dependencies before dependents.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<String, ()>,

    /// Map from step name to node index
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from a DAG
    ///
    /// Dependencies that are not defined as steps (e.g., snapshots) become
    /// leaf nodes.
    pub fn from_dag(dag: &Dag) -> Self {
        let mut graph = Self::new();

        for (step, deps) in dag.iter() {
            let step_idx = graph.add_step(step);
            for dep in deps {
                let dep_idx = graph.add_step(dep);
                graph.graph.update_edge(dep_idx, step_idx, ());
            }
        }

        graph
    }

    /// Adds a step to the graph, returning its node index
    fn add_step(&mut self, step: &str) -> NodeIndex {
        if let Some(idx) = self.node_map.get(step) {
            return *idx;
        }
        let idx = self.graph.add_node(step.to_string());
        self.node_map.insert(step.to_string(), idx);
        idx
    }

    fn index(&self, step: &str) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(step)
            .copied()
            .ok_or_else(|| GraphError::StepNotFound(step.to_string()))
    }

    fn neighbors(&self, step: &str, direction: Direction) -> Result<Vec<String>, GraphError> {
        let idx = self.index(step)?;
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Returns the direct dependencies of a step
    pub fn dependencies(&self, step: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors(step, Direction::Incoming)
    }

    /// Returns the steps that directly depend on a step
    pub fn dependents(&self, step: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors(step, Direction::Outgoing)
    }

    /// Returns every step that depends on `step`, directly or transitively
    pub fn all_dependents(&self, step: &str) -> Result<BTreeSet<String>, GraphError> {
        let start = self.index(step)?;
        let mut found = BTreeSet::new();

        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(idx) = bfs.next(&self.graph) {
            if idx == start {
                continue;
            }
            if let Some(name) = self.graph.node_weight(idx) {
                found.insert(name.clone());
            }
        }

        Ok(found)
    }

    /// Returns groups of steps that form dependency cycles
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .find_edge(component[0], component[0])
                        .is_some()
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Returns all steps in execution order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(_) => Err(GraphError::CycleDetected(
                self.cycles().into_iter().flatten().collect(),
            )),
        }
    }

    /// Returns true if the graph contains the step
    pub fn contains(&self, step: &str) -> bool {
        self.node_map.contains_key(step)
    }

    /// Returns the number of nodes (steps and leaf dependencies)
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}
