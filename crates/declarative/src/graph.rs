//! Dependency graph builder
//!
//! Turns the declared `dependencies()` of every resource into a DAG whose
//! edges read "must converge before", rejects cycles, and produces a total
//! order. Ties are broken by declaration order so the same input always
//! yields the same order.

use crate::error::{Error, Result};
use crate::resource::BoxedResource;
use crate::types::ResourceKey;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Directed acyclic graph over declared resources
///
/// Node indices equal declaration indices.
#[derive(Debug)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceKey, ()>,
    nodes: HashMap<ResourceKey, NodeIndex>,
}

impl ResourceGraph {
    /// Build the graph for a resource set
    ///
    /// Fails with a configuration error on duplicate keys or dependencies on
    /// undeclared keys, and with [`Error::Cycle`] if any resources require
    /// each other.
    pub fn build(resources: &[BoxedResource]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(resources.len(), resources.len() * 2);
        let mut nodes = HashMap::with_capacity(resources.len());

        for resource in resources {
            let key = resource.key();
            if nodes.contains_key(&key) {
                return Err(Error::configuration(format!(
                    "{key} is declared more than once"
                )));
            }
            let idx = graph.add_node(key.clone());
            nodes.insert(key, idx);
        }

        for (i, resource) in resources.iter().enumerate() {
            let node = NodeIndex::new(i);
            for dep in resource.dependencies() {
                let Some(&dep_node) = nodes.get(&dep) else {
                    return Err(Error::configuration(format!(
                        "{} depends on {dep}, which is not declared",
                        resource.key()
                    )));
                };
                graph.update_edge(dep_node, node, ());
            }
        }

        let built = Self { graph, nodes };
        built.check_acyclic()?;
        log::debug!(
            "Built dependency graph: {} resources, {} edges",
            built.graph.node_count(),
            built.graph.edge_count()
        );
        Ok(built)
    }

    /// Number of resources in the graph
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Declaration indices in convergence order
    ///
    /// Kahn's algorithm with a min-heap on declaration index: among all
    /// resources whose dependencies have converged, the earliest declared
    /// goes first.
    pub fn order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node.index());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        order
    }

    /// Direct dependencies of a resource, in declaration order
    pub fn dependencies_of(&self, key: &ResourceKey) -> Vec<&ResourceKey> {
        self.neighbors(key, Direction::Incoming)
    }

    /// Resources that directly depend on this one, in declaration order
    pub fn dependents_of(&self, key: &ResourceKey) -> Vec<&ResourceKey> {
        self.neighbors(key, Direction::Outgoing)
    }

    fn neighbors(&self, key: &ResourceKey, direction: Direction) -> Vec<&ResourceKey> {
        let Some(&node) = self.nodes.get(key) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        found.sort();
        found.into_iter().map(|n| &self.graph[n]).collect()
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .collect();

        if cycles.is_empty() {
            return Ok(());
        }

        // Report the cycle containing the earliest declared resource
        cycles.sort_by_key(|scc| scc.iter().min().copied());
        let path = self.cycle_path(&cycles[0]);
        Err(Error::Cycle {
            path: path.into_iter().map(|n| self.graph[n].clone()).collect(),
        })
    }

    /// Walk one concrete cycle inside a strongly connected component
    fn cycle_path(&self, scc: &[NodeIndex]) -> Vec<NodeIndex> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let Some(&start) = scc.iter().min() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        if self.extend_cycle(start, start, &members, &mut visited, &mut path) {
            path
        } else {
            let mut sorted = scc.to_vec();
            sorted.sort();
            sorted
        }
    }

    fn extend_cycle(
        &self,
        start: NodeIndex,
        current: NodeIndex,
        members: &HashSet<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(current, Direction::Outgoing)
            .filter(|n| members.contains(n))
            .collect();
        next.sort();

        for candidate in next {
            if candidate == start {
                return true;
            }
            if visited.insert(candidate) {
                path.push(candidate);
                if self.extend_cycle(start, candidate, members, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}
