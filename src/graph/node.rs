use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::resolution::SharedResolver;
use crate::stylesheet::Stylesheet;

/// Stable handle to a node in a [`DependencyGraph`](super::DependencyGraph).
///
/// Ids index the graph's node arena and are never reused, so an id stays
/// valid even after its node has been retired from the canonical-URL map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One loaded stylesheet and its place in the graph.
///
/// `upstream` lists the stylesheets this one loads (unresolved imports
/// already dropped, duplicates collapsed) in source order. The dropped
/// import URLs are kept in `unresolved` so the graph can link them once
/// their targets appear. `downstream` holds the stylesheets that load this
/// one and is maintained by the graph as back-edge bookkeeping.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    canonical_url: Url,
    stylesheet: Arc<Stylesheet>,
    resolver: SharedResolver,
    upstream: Vec<NodeId>,
    unresolved: Vec<String>,
    downstream: HashSet<NodeId>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        canonical_url: Url,
        stylesheet: Arc<Stylesheet>,
        resolver: SharedResolver,
        upstream: Vec<NodeId>,
        unresolved: Vec<String>,
    ) -> Self {
        Self {
            id,
            canonical_url,
            stylesheet,
            resolver,
            upstream,
            unresolved,
            downstream: HashSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn canonical_url(&self) -> &Url {
        &self.canonical_url
    }

    pub fn stylesheet(&self) -> &Arc<Stylesheet> {
        &self.stylesheet
    }

    /// The resolver that loaded this stylesheet.
    pub fn resolver(&self) -> &SharedResolver {
        &self.resolver
    }

    pub fn upstream(&self) -> &[NodeId] {
        &self.upstream
    }

    /// Imports, as written, that did not resolve to a stylesheet.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn downstream(&self) -> &HashSet<NodeId> {
        &self.downstream
    }

    /// Downstream ids in ascending order, for stable output.
    pub fn sorted_downstream(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.downstream.iter().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn add_downstream(&mut self, id: NodeId) {
        self.downstream.insert(id);
    }

    pub(crate) fn remove_downstream(&mut self, id: NodeId) -> bool {
        self.downstream.remove(&id)
    }

    pub(crate) fn replace(
        &mut self,
        stylesheet: Arc<Stylesheet>,
        upstream: Vec<NodeId>,
        unresolved: Vec<String>,
    ) {
        self.stylesheet = stylesheet;
        self.upstream = upstream;
        self.unresolved = unresolved;
    }

    /// Drops `id` from the upstream list, parking `url` as unresolved.
    pub(crate) fn unlink_upstream(&mut self, id: NodeId, url: String) {
        self.upstream.retain(|&up| up != id);
        if !self.unresolved.contains(&url) {
            self.unresolved.push(url);
        }
    }

    pub(crate) fn set_stylesheet(&mut self, stylesheet: Arc<Stylesheet>) {
        self.stylesheet = stylesheet;
    }
}
