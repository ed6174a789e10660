//! Group containment graph
//!
//! Edges point parent → child. Changing a group affects the group itself and
//! every group that reaches it through child references (its ancestors),
//! found by walking incoming edges.

use crate::features::groups::domain::CombineMode;
use crate::shared::models::DbKey;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

pub struct GroupParentGraph {
    graph: DiGraph<DbKey, CombineMode>,
    nodes: HashMap<DbKey, NodeIndex>,
}

impl GroupParentGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    /// Build from (parent, child, mode) triples
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (DbKey, DbKey, CombineMode)>,
    {
        let mut g = Self::new();
        for (parent, child, mode) in edges {
            g.add_edge(parent, child, mode);
        }
        g
    }

    fn node(&mut self, id: DbKey) -> NodeIndex {
        if let Some(idx) = self.nodes.get(&id) {
            return *idx;
        }
        let idx = self.graph.add_node(id);
        self.nodes.insert(id, idx);
        idx
    }

    pub fn add_edge(&mut self, parent: DbKey, child: DbKey, mode: CombineMode) {
        let p = self.node(parent);
        let c = self.node(child);
        self.graph.update_edge(p, c, mode);
    }

    /// Groups directly referencing `id` as a child
    pub fn parents_of(&self, id: DbKey) -> BTreeSet<DbKey> {
        let Some(idx) = self.nodes.get(&id) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect()
    }

    /// `id` plus every group that transitively contains it (BFS on incoming
    /// edges; cycles are visited once)
    pub fn ancestors_of(&self, id: DbKey) -> BTreeSet<DbKey> {
        let mut out = BTreeSet::from([id]);
        let Some(start) = self.nodes.get(&id).copied() else {
            return out;
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for parent in self.graph.neighbors_directed(current, Direction::Incoming) {
                if visited.insert(parent) {
                    out.insert(self.graph[parent]);
                    queue.push_back(parent);
                }
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for GroupParentGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(v: i64) -> DbKey {
        DbKey(v)
    }

    #[test]
    fn test_ancestors_through_chain() {
        // 1 ⊃ 2 ⊃ 3, 4 ⊃ 3
        let g = GroupParentGraph::from_edges([
            (k(1), k(2), CombineMode::Include),
            (k(2), k(3), CombineMode::Subtract),
            (k(4), k(3), CombineMode::Intersect),
        ]);
        assert_eq!(g.ancestors_of(k(3)), BTreeSet::from([k(1), k(2), k(3), k(4)]));
        assert_eq!(g.ancestors_of(k(2)), BTreeSet::from([k(1), k(2)]));
        assert_eq!(g.parents_of(k(3)), BTreeSet::from([k(2), k(4)]));
    }

    #[test]
    fn test_cycle_terminates() {
        let g = GroupParentGraph::from_edges([
            (k(1), k(2), CombineMode::Include),
            (k(2), k(1), CombineMode::Include),
            (k(3), k(3), CombineMode::Include),
        ]);
        assert_eq!(g.ancestors_of(k(1)), BTreeSet::from([k(1), k(2)]));
        assert_eq!(g.ancestors_of(k(3)), BTreeSet::from([k(3)]));
    }

    #[test]
    fn test_unknown_group_is_its_own_only_ancestor() {
        let g = GroupParentGraph::new();
        assert_eq!(g.ancestors_of(k(9)), BTreeSet::from([k(9)]));
        assert!(g.parents_of(k(9)).is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut g = GroupParentGraph::new();
        g.add_edge(k(1), k(2), CombineMode::Include);
        g.add_edge(k(1), k(2), CombineMode::Subtract);
        assert_eq!(g.edge_count(), 1);
    }
}
