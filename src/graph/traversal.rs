use std::collections::{HashSet, VecDeque};

use url::Url;

use super::{DependencyGraph, NodeId};

/// Which way to follow edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the stylesheets a node imports.
    Upstream,
    /// Towards the stylesheets that import a node.
    Downstream,
}

impl DependencyGraph {
    /// Everything `id` imports, directly or indirectly, nearest first.
    pub fn transitive_upstream(&self, id: NodeId) -> Vec<NodeId> {
        self.traverse_bfs(id, Direction::Upstream, usize::MAX)
    }

    /// Everything that imports `id`, directly or indirectly, nearest first.
    ///
    /// This is the set of stylesheets that need recompiling when `id`
    /// changes.
    pub fn transitive_downstream(&self, id: NodeId) -> Vec<NodeId> {
        self.traverse_bfs(id, Direction::Downstream, usize::MAX)
    }

    /// Canonical URLs affected by a change to `canonical_url`, including
    /// itself. Empty if the URL is not in the graph.
    pub fn impact_of(&self, canonical_url: &Url) -> Vec<Url> {
        let Some(id) = self.node_id(canonical_url) else {
            return Vec::new();
        };
        std::iter::once(id)
            .chain(self.transitive_downstream(id))
            .map(|id| self.nodes[id.0].canonical_url().clone())
            .collect()
    }

    /// Breadth-first walk from `start` (excluded from the result), following
    /// edges in `direction` for at most `max_depth` hops.
    pub fn traverse_bfs(&self, start: NodeId, direction: Direction, max_depth: usize) -> Vec<NodeId> {
        let mut result = Vec::new();
        if self.get(start).is_none() {
            return result;
        }

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(start);

        // Queue holds (node_id, current_depth).
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for neighbor in self.neighbors(current, direction) {
                if !visited.insert(neighbor) {
                    continue;
                }
                result.push(neighbor);
                queue.push_back((neighbor, depth + 1));
            }
        }

        result
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let node = &self.nodes[id.0];
        match direction {
            Direction::Upstream => node.upstream().to_vec(),
            Direction::Downstream => node.sorted_downstream(),
        }
    }
}
