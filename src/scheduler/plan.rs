use std::collections::HashMap;
use std::fmt::{self, Display};

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::Direction;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::core::{ArcStr, Hash32};
use crate::error::Error;
use crate::task::{Task, TaskKind};

/// A task as it appears in a [`Plan`].
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub name: String,
    pub kind: TaskKind,
    pub fingerprint: Hash32,
    pub location: Utf8PathBuf,
    /// The target was present when the plan was made. Cached nodes are not
    /// expanded, their dependencies will not be looked at.
    pub cached: bool,
}

/// The dependency graph below a root task, as it stands on disk right now.
///
/// Edges point from a dependency to the task that needs it and carry the
/// dependency's label. Tasks with the same identity share a node.
#[derive(Debug)]
pub struct Plan {
    graph: Graph<PlanNode, ArcStr>,
    root: NodeIndex,
}

impl Plan {
    pub(crate) fn build(root: &dyn Task) -> Result<Self, Error> {
        let mut builder = PlanBuilder {
            graph: Graph::new(),
            seen: HashMap::new(),
        };

        let root = builder.visit(root, &[])?;
        let graph = builder.graph;

        // The path check in `visit` should make this unreachable.
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(Error::Cycle(graph[cycle.node_id()].name.clone()));
        }

        Ok(Self { graph, root })
    }

    pub fn root(&self) -> &PlanNode {
        &self.graph[self.root]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every node, dependencies before the tasks that need them.
    pub fn order(&self) -> Vec<&PlanNode> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|index| &self.graph[index]).collect())
            .unwrap_or_default()
    }

    /// Nodes whose targets are absent and would be run.
    pub fn pending(&self) -> impl Iterator<Item = &PlanNode> {
        self.graph.node_weights().filter(|node| !node.cached)
    }

    pub fn node(&self, location: &Utf8Path) -> Option<&PlanNode> {
        self.graph
            .node_weights()
            .find(|node| node.location == location)
    }

    /// Labels and nodes of the direct dependencies of `node`.
    pub fn dependencies_of(&self, node: &PlanNode) -> Vec<(&str, &PlanNode)> {
        let Some(index) = self.index_of(node) else {
            return Vec::new();
        };

        let mut deps: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| (&**edge.weight(), &self.graph[edge.source()]))
            .collect();

        // petgraph walks edges newest first
        deps.reverse();
        deps
    }

    fn index_of(&self, node: &PlanNode) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&index| self.graph[index].fingerprint == node.fingerprint)
    }

    pub(crate) fn graph(&self) -> &Graph<PlanNode, ArcStr> {
        &self.graph
    }
}

struct PlanBuilder {
    graph: Graph<PlanNode, ArcStr>,
    seen: HashMap<Hash32, NodeIndex>,
}

impl PlanBuilder {
    fn visit(&mut self, task: &dyn Task, path: &[Hash32]) -> Result<NodeIndex, Error> {
        let fingerprint = task.id().fingerprint();

        if path.contains(&fingerprint) {
            return Err(Error::Cycle(task.name()));
        }

        if let Some(&index) = self.seen.get(&fingerprint) {
            return Ok(index);
        }

        let target = task.output();
        let cached = target.exists();

        let index = self.graph.add_node(PlanNode {
            name: task.name(),
            kind: task.id().kind(),
            fingerprint,
            location: target.location().to_path_buf(),
            cached,
        });
        self.seen.insert(fingerprint, index);

        if cached {
            return Ok(index);
        }

        let mut path = path.to_vec();
        path.push(fingerprint);

        let deps = task.dependencies()?;

        for (label, dep) in deps.entries() {
            let child = self.visit(dep.as_ref(), &path).map_err(|e| match e {
                Error::Cycle(_) => e,
                e => Error::DependencyFailed {
                    label: label.to_string(),
                    task: task.name(),
                    source: Box::new(e),
                },
            })?;

            self.graph.add_edge(child, index, label.clone());
        }

        Ok(index)
    }
}

impl Display for Plan {
    /// Mermaid flowchart of the plan, cached nodes in light blue.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let name = node.name.replace('"', "\\\"");
            let state = if node.cached { "Cached" } else { "Pending" };

            writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), name, state)?;
            if node.cached {
                writeln!(f, "    style {} fill:#ADD8E6", index.index())?;
            }
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {} -- \"{}\" --> {}",
                edge.source().index(),
                edge.weight.replace('"', "\\\""),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}
