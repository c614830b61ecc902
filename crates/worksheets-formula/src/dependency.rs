//! Dependency tracking for formula recomputation

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use worksheets_core::FieldIndex;

/// Dependency graph for computed fields
///
/// An edge `precedent → dependent` means the dependent's formula reads the
/// precedent. Ordered collections keep every traversal deterministic, with
/// ties broken by ascending field index.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Every field known to the graph, including ones without edges
    nodes: BTreeSet<FieldIndex>,
    /// Field → Fields that depend on it (dependents)
    dependents: BTreeMap<FieldIndex, BTreeSet<FieldIndex>>,
    /// Field → Fields it depends on (precedents)
    precedents: BTreeMap<FieldIndex, BTreeSet<FieldIndex>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field with no edges yet
    pub fn add_node(&mut self, field: FieldIndex) {
        self.nodes.insert(field);
    }

    /// Add a dependency: dependent depends on precedent
    pub fn add_dependency(&mut self, precedent: FieldIndex, dependent: FieldIndex) {
        self.nodes.insert(precedent);
        self.nodes.insert(dependent);
        self.dependents
            .entry(precedent)
            .or_default()
            .insert(dependent);
        self.precedents
            .entry(dependent)
            .or_default()
            .insert(precedent);
    }

    /// Get fields that depend on the given field, in ascending order
    pub fn get_dependents(&self, field: FieldIndex) -> impl Iterator<Item = FieldIndex> + '_ {
        self.dependents
            .get(&field)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Get fields that the given field depends on, in ascending order
    pub fn get_precedents(&self, field: FieldIndex) -> impl Iterator<Item = FieldIndex> + '_ {
        self.precedents
            .get(&field)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Every field reachable from `changed` through dependent edges,
    /// excluding the changed fields themselves unless they are reachable
    pub fn transitive_dependents(&self, changed: &[FieldIndex]) -> BTreeSet<FieldIndex> {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<FieldIndex> = changed.iter().copied().collect();

        while let Some(field) = queue.pop_front() {
            for dependent in self.get_dependents(field) {
                if reached.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        reached
    }

    /// Topological order of all nodes (Kahn's algorithm).
    ///
    /// Among fields that are ready at the same time the smallest index goes
    /// first. On a cycle, returns the fields that could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<FieldIndex>, Vec<FieldIndex>> {
        let mut pending: BTreeMap<FieldIndex, usize> = self
            .nodes
            .iter()
            .map(|&field| (field, self.get_precedents(field).count()))
            .collect();

        let mut ready: BTreeSet<FieldIndex> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&field, _)| field)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(field) = ready.pop_first() {
            pending.remove(&field);
            order.push(field);

            for dependent in self.get_dependents(field) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(order)
        } else {
            Err(pending.into_keys().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn idx(i: i32) -> FieldIndex {
        FieldIndex::new(i)
    }

    #[test]
    fn test_add_dependency() {
        let mut graph = DependencyGraph::new();

        graph.add_dependency(idx(1), idx(2));

        assert!(graph.get_dependents(idx(1)).any(|f| f == idx(2)));
        assert!(graph.get_precedents(idx(2)).any(|f| f == idx(1)));
    }

    #[test]
    fn test_topological_order_breaks_ties_by_index() {
        let mut graph = DependencyGraph::new();
        // 1 feeds 5 and 3; 3 feeds 4; 2 is isolated
        graph.add_dependency(idx(1), idx(5));
        graph.add_dependency(idx(1), idx(3));
        graph.add_dependency(idx(3), idx(4));
        graph.add_node(idx(2));

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![idx(1), idx(2), idx(3), idx(4), idx(5)]);
    }

    #[test]
    fn test_cycle_reports_unordered_fields() {
        let mut graph = DependencyGraph::new();

        // 1 -> 2 -> 3 -> 1 (circular), 4 hangs off the cycle
        graph.add_dependency(idx(1), idx(2));
        graph.add_dependency(idx(2), idx(3));
        graph.add_dependency(idx(3), idx(1));
        graph.add_dependency(idx(3), idx(4));
        graph.add_node(idx(9));

        let stuck = graph.topological_order().unwrap_err();
        assert_eq!(stuck, vec![idx(1), idx(2), idx(3), idx(4)]);
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(idx(1), idx(2));
        graph.add_dependency(idx(2), idx(3));
        graph.add_dependency(idx(4), idx(5));

        let reached = graph.transitive_dependents(&[idx(1)]);
        assert_eq!(reached.into_iter().collect::<Vec<_>>(), vec![idx(2), idx(3)]);
    }

    proptest! {
        /// Edges that only point from a smaller to a larger index never form
        /// a cycle, and the order respects every edge.
        #[test]
        fn prop_forward_edges_order_respects_edges(
            edges in prop::collection::vec((1i32..20, 1i32..20), 0..60)
        ) {
            let mut graph = DependencyGraph::new();
            let mut kept = Vec::new();
            for (a, b) in edges {
                if a < b {
                    graph.add_dependency(idx(a), idx(b));
                    kept.push((idx(a), idx(b)));
                }
            }

            let order = graph.topological_order().unwrap();
            let position = |f: FieldIndex| order.iter().position(|&x| x == f).unwrap();
            for (a, b) in kept {
                prop_assert!(position(a) < position(b));
            }
        }
    }
}
