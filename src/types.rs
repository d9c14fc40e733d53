use serde::{Deserialize, Serialize};

use crate::stylesheet::Syntax;

/// What happened when a node was reloaded from its resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadOutcome {
    /// The source is byte-for-byte identical; edges were left alone.
    Unchanged,
    /// The source changed and the node's imports were re-resolved.
    Updated,
    /// The resolver can no longer load the file; the node was evicted.
    Removed,
}

impl ReloadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadOutcome::Unchanged => "unchanged",
            ReloadOutcome::Updated => "updated",
            ReloadOutcome::Removed => "removed",
        }
    }
}

/// Aggregate counts over the live nodes of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    /// Number of upstream edges.
    pub edge_count: usize,
    /// Nodes nothing imports.
    pub root_count: usize,
    /// Nodes that import nothing.
    pub leaf_count: usize,
}

/// Serializable view of one node, with neighbours named by canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub canonical_url: String,
    pub display_url: String,
    pub syntax: Syntax,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    /// Imports, as written, still waiting for a target.
    pub unresolved: Vec<String>,
}
