#![allow(clippy::result_large_err)]

//! Graph planning over a [`WorkflowDefinition`]: structural validation,
//! reachability from `start` and topological ordering.

use crate::core::error::AppError;
use crate::core::workflow_graph::schema::{definition_error, NodeKind, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Node weight carrying display information.
struct NodeLabel {
    id: String,
    kind: NodeKind,
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.id, self.kind)
    }
}

/// Validated execution plan for one workflow definition.
pub struct WorkflowGraph {
    graph: DiGraph<NodeLabel, &'static str>,
    index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
    reachable: HashSet<NodeIndex>,
}

impl WorkflowGraph {
    /// Build the plan, rejecting duplicate ids, a missing or repeated `start`
    /// node, dangling edges, node ids equal to `input_key`, and cycles.
    pub fn build(definition: &WorkflowDefinition, input_key: &str) -> Result<Self, AppError> {
        definition.validate()?;

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut starts = Vec::new();
        for node in &definition.nodes {
            if node.id == input_key {
                return Err(definition_error(
                    format!("node id '{}' collides with the input key", node.id),
                    "PW-WF-004",
                )
                .with_context("node", node.id.as_str()));
            }
            let idx = graph.add_node(NodeLabel {
                id: node.id.clone(),
                kind: node.kind(),
            });
            index.insert(node.id.clone(), idx);
            if node.kind() == NodeKind::Start {
                starts.push(idx);
            }
        }

        let start = match starts.as_slice() {
            [start] => *start,
            [] => {
                return Err(definition_error(
                    "workflow must contain exactly one start node, found none",
                    "PW-WF-002",
                ))
            }
            _ => {
                return Err(definition_error(
                    format!(
                        "workflow must contain exactly one start node, found {}",
                        starts.len()
                    ),
                    "PW-WF-002",
                ))
            }
        };

        for edge in &definition.edges {
            let endpoint = |id: &str| {
                index.get(id).copied().ok_or_else(|| {
                    definition_error(
                        format!("edge '{}' references unknown node '{}'", edge.id, id),
                        "PW-WF-003",
                    )
                    .with_context("node", id)
                })
            };
            let from = endpoint(&edge.source)?;
            let to = endpoint(&edge.target)?;
            graph.add_edge(from, to, "");
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()].id.clone();
            definition_error(format!("workflow contains a cycle through '{}'", id), "PW-WF-005")
                .with_context("node", id)
        })?;

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(nx) = bfs.next(&graph) {
            reachable.insert(nx);
        }

        Ok(Self {
            graph,
            index,
            order,
            reachable,
        })
    }

    /// Reachable node ids in a topological order.
    pub fn execution_order(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|idx| self.reachable.contains(idx))
            .map(|idx| self.graph[*idx].id.clone())
            .collect()
    }

    pub fn is_reachable(&self, id: &str) -> bool {
        self.index
            .get(id)
            .is_some_and(|idx| self.reachable.contains(idx))
    }

    /// Ids of nodes with no path from `start`, sorted.
    pub fn unreachable(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .index
            .iter()
            .filter(|(_, idx)| !self.reachable.contains(idx))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Reachable direct predecessors of `id`.
    pub fn predecessors(&self, id: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter(|pred| self.reachable.contains(pred))
            .map(|pred| self.graph[pred].id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Reachable nodes grouped into waves: every node of a wave has all of its
    /// reachable predecessors in earlier waves. Within a wave nodes keep their
    /// topological order.
    pub fn waves(&self) -> Vec<Vec<String>> {
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in self.order.iter().filter(|idx| self.reachable.contains(idx)) {
            let depth = self
                .graph
                .neighbors_directed(*idx, Direction::Incoming)
                .filter_map(|pred| level.get(&pred))
                .map(|depth| depth + 1)
                .max()
                .unwrap_or(0);
            level.insert(*idx, depth);
        }
        let mut waves: Vec<Vec<String>> = Vec::new();
        for idx in self.order.iter().filter(|idx| self.reachable.contains(idx)) {
            let depth = level[idx];
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(self.graph[*idx].id.clone());
        }
        waves
    }

    /// Render the graph as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}

/// Render a definition as DOT without requiring it to be valid.
pub fn workflow_to_dot(definition: &WorkflowDefinition) -> String {
    let mut graph: DiGraph<NodeLabel, &'static str> = DiGraph::new();
    let mut index = HashMap::new();
    for node in &definition.nodes {
        let idx = graph.add_node(NodeLabel {
            id: node.id.clone(),
            kind: node.kind(),
        });
        index.insert(node.id.as_str(), idx);
    }
    for edge in &definition.edges {
        if let (Some(&from), Some(&to)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) {
            graph.add_edge(from, to, "");
        }
    }
    format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
}
