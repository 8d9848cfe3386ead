//! Ordering of coupled variables into sequentially solvable blocks.
use crate::errors::{RSTSError, RSTSResult};
use log::debug;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A set of variables that can be solved together
pub type Block = Vec<String>;

/// Dependencies between variables, in declaration order.
///
/// Each entry maps a variable to the variables whose values are needed to solve for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDependencyGraph")]
pub struct DependencyGraph {
    entries: Vec<(String, Vec<String>)>,
}

/// Serialised form, declared again through [`DependencyGraph::insert`] when read
#[derive(Deserialize)]
struct RawDependencyGraph {
    entries: Vec<(String, Vec<String>)>,
}

impl From<RawDependencyGraph> for DependencyGraph {
    fn from(raw: RawDependencyGraph) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, dependencies) in raw.entries {
            graph.insert(name, dependencies);
        }
        graph
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable and its dependencies.
    ///
    /// Redeclaring a variable replaces its dependencies but keeps its original position.
    pub fn with_variable(mut self, name: &str, dependencies: &[&str]) -> Self {
        self.insert(
            name.to_string(),
            dependencies.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    pub fn insert(&mut self, name: String, dependencies: Vec<String>) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = dependencies,
            None => self.entries.push((name, dependencies)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn variables(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, deps)| deps.as_slice())
    }

    /// Translate virtual variable names into the state variables they test.
    ///
    /// Names without an entry in `dual_names` are kept as they are.
    pub fn replace_virtuals(&self, dual_names: &HashMap<String, String>) -> DependencyGraph {
        let rename = |name: &String| dual_names.get(name).unwrap_or(name).clone();

        let mut out = DependencyGraph::new();
        for (name, deps) in &self.entries {
            out.insert(rename(name), deps.iter().map(rename).collect());
        }
        out
    }

    /// Order the variables into blocks.
    ///
    /// Every variable of a block only depends on variables of earlier blocks.
    /// Variables are placed in the earliest possible block and keep their declaration order
    /// within a block.
    /// A variable depending on itself is allowed. Dependencies on undeclared names are
    /// treated as external data and do not affect the ordering.
    pub fn resolve(&self) -> RSTSResult<Vec<Block>> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let nodes: HashMap<&str, NodeIndex> = self
            .entries
            .iter()
            .map(|(name, _)| (name.as_str(), graph.add_node(name.as_str())))
            .collect();

        for (name, deps) in &self.entries {
            let node = nodes[name.as_str()];
            for dep in deps {
                if dep == name {
                    continue;
                }
                match nodes.get(dep.as_str()) {
                    Some(dep_node) => {
                        graph.add_edge(*dep_node, node, ());
                    }
                    None => debug!("Ignoring external dependency '{}' of '{}'", dep, name),
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| RSTSError::CyclicDependency {
            variable: graph[cycle.node_id()].to_string(),
        })?;

        // Longest path from a source gives the earliest block a variable can be solved in
        let mut levels = vec![0usize; graph.node_count()];
        for node in order {
            let level = graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .map(|dep| levels[dep.index()] + 1)
                .max()
                .unwrap_or(0);
            levels[node.index()] = level;
        }

        let n_block = levels.iter().max().map_or(0, |max| max + 1);
        let mut blocks: Vec<Block> = vec![vec![]; n_block];
        for (ii, (name, _)) in self.entries.iter().enumerate() {
            blocks[levels[ii]].push(name.clone());
        }
        Ok(blocks)
    }
}
