//! Activation dependency graph used for diagnostics.
//!
//! Built over the surviving candidate set, with an edge from each dependent to
//! the candidate satisfying its positive dependencies. Resolution itself never
//! needs the graph; it exists to render "who pulled this in" chains in error
//! messages.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use graft_core::types::{DependencyKind, ModCandidate};

/// Directed graph over activated mod ids.
#[derive(Debug)]
pub struct ActivationGraph {
    graph: DiGraph<String, DependencyKind>,
    node_map: IndexMap<String, NodeIndex>,
}

impl ActivationGraph {
    /// Build the graph for a candidate set. Edges point from dependent to the
    /// candidate that satisfies the dependency; unsatisfied edges are absent.
    pub fn new(candidates: &[ModCandidate]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = IndexMap::new();

        for candidate in candidates {
            let index = graph.add_node(candidate.id().to_string());
            node_map.insert(candidate.id().to_string(), index);
        }

        for candidate in candidates {
            let from = node_map[candidate.id()];
            for dependency in candidate.dependencies() {
                if !dependency.kind.is_positive() {
                    continue;
                }

                let target = candidates
                    .iter()
                    .find(|c| c.satisfies_id(&dependency.target));
                if let Some(target) = target {
                    let to = node_map[target.id()];
                    graph.add_edge(from, to, dependency.kind);
                }
            }
        }

        Self { graph, node_map }
    }

    pub fn mod_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Chain of dependents leading to `id`, outermost first and ending at
    /// `id` itself. Walks incoming hard-dependency edges until it reaches a
    /// mod nothing depends on, refusing to revisit a node.
    pub fn dependent_chain(&self, id: &str) -> Vec<String> {
        let Some(&start) = self.node_map.get(id) else {
            return vec![id.to_string()];
        };

        let mut chain = vec![start];
        let mut current = start;

        loop {
            let parent = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .map(|edge| edge.source())
                .find(|source| !chain.contains(source));

            match parent {
                Some(source) => {
                    chain.push(source);
                    current = source;
                }
                None => break,
            }
        }

        chain
            .into_iter()
            .rev()
            .map(|index| self.graph[index].clone())
            .collect()
    }

    /// Format a chain as "a -> b -> c".
    pub fn format_chain(chain: &[String]) -> String {
        chain.join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::types::{ModDependency, Version};

    fn candidate(id: &str, deps: &[&str]) -> ModCandidate {
        let mut builder = ModCandidate::builder(id, Version::parse("1.0.0"));
        for dep in deps {
            builder = builder.dependency(ModDependency::any(*dep, DependencyKind::Depends));
        }
        builder.build()
    }

    #[test]
    fn test_edges_follow_satisfied_dependencies() {
        let mods = vec![
            candidate("app", &["lib"]),
            candidate("lib", &["base"]),
            candidate("base", &[]),
        ];

        let graph = ActivationGraph::new(&mods);
        assert_eq!(graph.mod_count(), 3);
        assert_eq!(graph.dependency_count(), 2);
    }

    #[test]
    fn test_dependent_chain_reaches_the_root() {
        let mods = vec![
            candidate("app", &["lib"]),
            candidate("lib", &["base"]),
            candidate("base", &[]),
        ];

        let graph = ActivationGraph::new(&mods);
        let chain = graph.dependent_chain("base");
        assert_eq!(chain, ["app", "lib", "base"]);
        assert_eq!(ActivationGraph::format_chain(&chain), "app -> lib -> base");
    }

    #[test]
    fn test_chain_terminates_on_dependency_cycles() {
        let mods = vec![candidate("a", &["b"]), candidate("b", &["a"])];

        let graph = ActivationGraph::new(&mods);
        let chain = graph.dependent_chain("a");
        assert_eq!(chain.last().unwrap(), "a");
        assert!(chain.len() <= 2);
    }

    #[test]
    fn test_unknown_id_yields_singleton_chain() {
        let graph = ActivationGraph::new(&[]);
        assert_eq!(graph.dependent_chain("ghost"), ["ghost"]);
    }
}
