/// Node records and their ids.
pub mod node;

/// Transitive walks over upstream and downstream edges.
pub mod traversal;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::errors::{Result, StyleGraphError};
use crate::resolution::{original_url, ResolutionCache, ResolvedUrl, SharedResolver};
use crate::stylesheet::Stylesheet;
use crate::types::{GraphStats, NodeSummary, ReloadOutcome};

pub use node::{Node, NodeId};

/// Every stylesheet reachable from the roots added so far, with the import
/// edges between them.
///
/// Nodes live in an arena and are addressed by [`NodeId`]; the canonical-URL
/// map decides whether a file has already been resolved. Edges are created
/// only when a node is constructed: the new node lists its imports as
/// upstream and is registered in each of their downstream sets. So for every
/// node `n` and every `m` in `n.upstream()`, `n` is in `m.downstream()` until
/// `n` is detached.
///
/// Imports that do not resolve are remembered on the importer. Whenever a
/// new canonical URL enters the map, or one leaves it through
/// [`DependencyGraph::evict`], the affected importers are resolved again and
/// their upstream lists rewired in place.
#[derive(Debug)]
pub struct DependencyGraph {
    cache: ResolutionCache,
    nodes: Vec<Node>,
    by_url: HashMap<Url, NodeId>,
    /// Canonical URLs whose imports are being resolved right now.
    in_progress: HashSet<Url>,
    detect_cycles: bool,
}

/// What an import written inside a stylesheet resolved to.
enum Import {
    Node(NodeId),
    /// Nothing could be canonicalized or loaded for it.
    Unresolved,
    /// It closed a cycle and was dropped.
    Dropped,
}

/// The resolved imports of one stylesheet.
#[derive(Debug, Default)]
struct Upstream {
    ids: Vec<NodeId>,
    unresolved: Vec<String>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl DependencyGraph {
    /// Creates an empty graph that resolves through `cache`.
    ///
    /// Circular imports are reported as errors unless turned off with
    /// [`DependencyGraph::with_cycle_detection`].
    pub fn new(cache: ResolutionCache) -> Self {
        Self {
            cache,
            nodes: Vec::new(),
            by_url: HashMap::new(),
            in_progress: HashSet::new(),
            detect_cycles: true,
        }
    }

    /// With detection off, an import that closes a cycle is dropped from the
    /// importer's upstream and a warning is logged.
    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResolutionCache {
        &mut self.cache
    }

    /// Adds a root stylesheet and everything it transitively imports.
    ///
    /// Returns the stylesheet. Adding a URL whose canonical form is already
    /// in the graph returns the existing stylesheet without building
    /// anything. Fails with [`StyleGraphError::NotFound`] if `url` cannot be
    /// canonicalized or loaded. Imports inside the stylesheet that cannot be
    /// resolved are left out of its upstream rather than failing the add.
    ///
    /// When new nodes were built, pending imports elsewhere in the graph are
    /// retried so they can link to them.
    pub fn add(&mut self, url: &str) -> Result<Arc<Stylesheet>> {
        let Some(resolved) = self.cache.canonicalize(url, None, None) else {
            return Err(StyleGraphError::NotFound {
                url: url.to_string(),
            });
        };

        if let Some(&id) = self.by_url.get(&resolved.canonical_url) {
            debug!(url, canonical = %resolved.canonical_url, "root already in graph");
            return Ok(Arc::clone(self.nodes[id.0].stylesheet()));
        }

        let original_url = original_url(url, None);
        let Some(stylesheet) = self.cache.load(
            &resolved.resolver,
            &resolved.canonical_url,
            original_url.as_ref(),
        )?
        else {
            return Err(StyleGraphError::NotFound {
                url: url.to_string(),
            });
        };

        self.build_node(resolved, Arc::clone(&stylesheet))?;
        self.resolve_pending();
        Ok(stylesheet)
    }

    /// Resolves an import written inside the stylesheet at `base_url`.
    ///
    /// Unresolvable imports come back as [`Import::Unresolved`]; reporting
    /// them is left to whoever evaluates the stylesheet. Only parse errors
    /// and circular imports are errors here.
    fn resolve_import(
        &mut self,
        url: &str,
        base_resolver: &SharedResolver,
        base_url: &Url,
    ) -> Result<Import> {
        let Some(resolved) = self
            .cache
            .canonicalize(url, Some(base_resolver), Some(base_url))
        else {
            debug!(url, base = %base_url, "import left unresolved");
            return Ok(Import::Unresolved);
        };

        if self.in_progress.contains(&resolved.canonical_url) {
            return self.circular_import(&resolved.canonical_url, base_url);
        }

        if let Some(&id) = self.by_url.get(&resolved.canonical_url) {
            return Ok(Import::Node(id));
        }

        let original_url = original_url(url, Some(base_url));
        let Some(stylesheet) = self.cache.load(
            &resolved.resolver,
            &resolved.canonical_url,
            original_url.as_ref(),
        )?
        else {
            debug!(url, canonical = %resolved.canonical_url, "import could not be loaded");
            return Ok(Import::Unresolved);
        };

        self.build_node(resolved, stylesheet).map(Import::Node)
    }

    fn circular_import(&self, canonical_url: &Url, importer: &Url) -> Result<Import> {
        if self.detect_cycles {
            return Err(StyleGraphError::CircularImport {
                url: canonical_url.to_string(),
            });
        }
        warn!(url = %canonical_url, importer = %importer, "dropping circular import");
        Ok(Import::Dropped)
    }

    /// Resolves the imports of `stylesheet`, then constructs and registers
    /// its node.
    fn build_node(&mut self, resolved: ResolvedUrl, stylesheet: Arc<Stylesheet>) -> Result<NodeId> {
        let ResolvedUrl {
            resolver,
            canonical_url,
        } = resolved;

        self.in_progress.insert(canonical_url.clone());
        let upstream = self.resolve_upstream(&stylesheet, &resolver, &canonical_url);
        self.in_progress.remove(&canonical_url);

        Ok(self.insert_node(canonical_url, stylesheet, resolver, upstream?))
    }

    fn resolve_upstream(
        &mut self,
        stylesheet: &Stylesheet,
        resolver: &SharedResolver,
        base_url: &Url,
    ) -> Result<Upstream> {
        let mut upstream = Upstream::default();
        for dependency in stylesheet.dependencies() {
            match self.resolve_import(&dependency, resolver, base_url)? {
                Import::Node(id) => {
                    if !upstream.ids.contains(&id) {
                        upstream.ids.push(id);
                    }
                }
                Import::Unresolved => {
                    if !upstream.unresolved.contains(&dependency) {
                        upstream.unresolved.push(dependency);
                    }
                }
                Import::Dropped => {}
            }
        }
        Ok(upstream)
    }

    /// Constructs a node, wires it into the downstream set of each of its
    /// upstream nodes, and only then makes it visible in the URL map.
    fn insert_node(
        &mut self,
        canonical_url: Url,
        stylesheet: Arc<Stylesheet>,
        resolver: SharedResolver,
        upstream: Upstream,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        for &up in &upstream.ids {
            self.nodes[up.0].add_downstream(id);
        }
        debug!(
            %id,
            canonical = %canonical_url,
            upstream = upstream.ids.len(),
            unresolved = upstream.unresolved.len(),
            "constructed node"
        );
        self.nodes.push(Node::new(
            id,
            canonical_url.clone(),
            stylesheet,
            resolver,
            upstream.ids,
            upstream.unresolved,
        ));
        self.by_url.insert(canonical_url, id);
        id
    }
}

// ---------------------------------------------------------------------------
// Invalidation
// ---------------------------------------------------------------------------

impl DependencyGraph {
    /// Removes `id` from the downstream set of each of its upstream nodes.
    ///
    /// The node's own downstream set and its entry in the URL map are left
    /// alone; see [`DependencyGraph::retire`] to do both.
    ///
    /// # Panics
    ///
    /// Panics if an upstream node does not list `id` as downstream, which
    /// means the graph's edges are corrupt (detaching the same node twice
    /// does this).
    pub fn detach(&mut self, id: NodeId) {
        let upstream = self.nodes[id.0].upstream().to_vec();
        for up in upstream {
            let removed = self.nodes[up.0].remove_downstream(id);
            assert!(
                removed,
                "{} was missing from the downstream set of {}",
                self.nodes[id.0].canonical_url(),
                self.nodes[up.0].canonical_url()
            );
        }
        debug!(%id, "detached node");
    }

    /// Removes `canonical_url` from the URL map without touching any edges.
    pub fn forget(&mut self, canonical_url: &Url) -> Option<NodeId> {
        self.by_url.remove(canonical_url)
    }

    /// Detaches the node for `canonical_url` and removes it from the URL map.
    ///
    /// Importers keep the retired id in their upstream lists; re-adding the
    /// URL creates a fresh node. [`DependencyGraph::evict`] also rewires the
    /// importers.
    pub fn retire(&mut self, canonical_url: &Url) -> Option<NodeId> {
        let id = *self.by_url.get(canonical_url)?;
        self.detach(id);
        self.forget(canonical_url)
    }

    /// Retires the node for `canonical_url` and resolves the imports of
    /// each of its importers again, so none of them keeps an edge to the
    /// retired node.
    ///
    /// An import that now resolves elsewhere is linked there; otherwise it
    /// is left pending and gets linked when its target comes back.
    pub fn evict(&mut self, canonical_url: &Url) -> Option<NodeId> {
        let id = *self.by_url.get(canonical_url)?;
        let importers = self.nodes[id.0].sorted_downstream();
        let arena = self.nodes.len();

        self.retire(canonical_url);
        self.cache.clear_import(canonical_url);

        for importer in importers {
            if !self.is_live(importer) {
                continue;
            }
            let stylesheet = Arc::clone(self.nodes[importer.0].stylesheet());
            if let Err(e) = self.reresolve(importer, stylesheet) {
                warn!(
                    importer = %self.nodes[importer.0].canonical_url(),
                    error = %e,
                    "could not re-resolve imports, unlinking evicted node"
                );
                self.nodes[importer.0].unlink_upstream(id, canonical_url.to_string());
                self.nodes[id.0].remove_downstream(importer);
            }
        }

        // Re-resolving may have cached the vanished file as a load miss.
        self.cache.clear_import(canonical_url);
        if self.nodes.len() > arena {
            self.resolve_pending();
        }
        debug!(%id, canonical = %canonical_url, "evicted node");
        Some(id)
    }

    /// Reloads the stylesheet at `canonical_url` from its resolver.
    ///
    /// If the source changed, its imports are resolved again and the node's
    /// upstream edges are replaced in place, so the node keeps its id and
    /// its downstream set. If the source is the same but some imports were
    /// pending, those are retried. If the resolver can no longer load it,
    /// the node is evicted.
    pub fn reload(&mut self, canonical_url: &Url) -> Result<ReloadOutcome> {
        let Some(&id) = self.by_url.get(canonical_url) else {
            return Err(StyleGraphError::NotFound {
                url: canonical_url.to_string(),
            });
        };
        let resolver = Arc::clone(self.nodes[id.0].resolver());
        let previous = Arc::clone(self.nodes[id.0].stylesheet());

        self.cache.clear_import(canonical_url);
        let Some(stylesheet) = self
            .cache
            .load(&resolver, canonical_url, Some(previous.url()))?
        else {
            debug!(canonical = %canonical_url, "stylesheet disappeared, evicting node");
            self.evict(canonical_url);
            return Ok(ReloadOutcome::Removed);
        };

        if stylesheet.content_hash() == previous.content_hash() {
            self.nodes[id.0].set_stylesheet(stylesheet);
            if !self.nodes[id.0].unresolved().is_empty() {
                if let Err(e) = self.relink(id) {
                    warn!(url = %canonical_url, error = %e, "could not link pending imports");
                }
            }
            return Ok(ReloadOutcome::Unchanged);
        }

        let arena = self.nodes.len();
        self.reresolve(id, stylesheet)?;
        if self.nodes.len() > arena {
            self.resolve_pending();
        }
        debug!(%id, canonical = %canonical_url, "reloaded node");
        Ok(ReloadOutcome::Updated)
    }

    /// Retries the pending imports of every live node, repeating while that
    /// builds new nodes. Returns how many nodes gained or changed edges.
    pub fn resolve_pending(&mut self) -> usize {
        let mut relinked = 0;
        loop {
            let arena = self.nodes.len();
            let pending: Vec<NodeId> = self
                .nodes()
                .iter()
                .filter(|node| !node.unresolved().is_empty())
                .map(|node| node.id())
                .collect();

            for id in pending {
                if !self.is_live(id) {
                    continue;
                }
                match self.relink(id) {
                    Ok(true) => relinked += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        url = %self.nodes[id.0].canonical_url(),
                        error = %e,
                        "could not link pending imports"
                    ),
                }
            }

            if self.nodes.len() == arena {
                break;
            }
        }
        relinked
    }

    /// Resolves the imports of `id` again if any of its pending ones
    /// canonicalizes now. Returns whether its upstream changed.
    fn relink(&mut self, id: NodeId) -> Result<bool> {
        let node = &self.nodes[id.0];
        let pending = node.unresolved().to_vec();
        let resolver = Arc::clone(node.resolver());
        let base_url = node.canonical_url().clone();

        let mut found = false;
        for url in &pending {
            found |= self
                .cache
                .canonicalize(url, Some(&resolver), Some(&base_url))
                .is_some();
        }
        if !found {
            return Ok(false);
        }

        let stylesheet = Arc::clone(self.nodes[id.0].stylesheet());
        self.reresolve(id, stylesheet)
    }

    /// Resolves the imports of `stylesheet` as the new source of `id` and
    /// swaps in the resulting upstream edges. Returns whether the upstream
    /// list changed.
    fn reresolve(&mut self, id: NodeId, stylesheet: Arc<Stylesheet>) -> Result<bool> {
        let resolver = Arc::clone(self.nodes[id.0].resolver());
        let canonical_url = self.nodes[id.0].canonical_url().clone();

        self.in_progress.insert(canonical_url.clone());
        let upstream = self.resolve_upstream(&stylesheet, &resolver, &canonical_url);
        self.in_progress.remove(&canonical_url);
        let mut upstream = upstream?;
        upstream.ids = self.break_cycles(id, upstream.ids)?;

        let changed = upstream.ids.as_slice() != self.nodes[id.0].upstream();
        self.detach(id);
        for &up in &upstream.ids {
            self.nodes[up.0].add_downstream(id);
        }
        self.nodes[id.0].replace(stylesheet, upstream.ids, upstream.unresolved);
        Ok(changed)
    }

    /// Rejects (or, without cycle detection, drops) new upstream edges that
    /// point back at `id` or at something that already depends on it.
    fn break_cycles(&self, id: NodeId, upstream: Vec<NodeId>) -> Result<Vec<NodeId>> {
        let mut dependents: HashSet<NodeId> = self.transitive_downstream(id).into_iter().collect();
        dependents.insert(id);

        let mut kept = Vec::with_capacity(upstream.len());
        for up in upstream {
            if dependents.contains(&up) {
                let url = self.nodes[up.0].canonical_url();
                if self.detect_cycles {
                    return Err(StyleGraphError::CircularImport {
                        url: url.to_string(),
                    });
                }
                warn!(url = %url, importer = %self.nodes[id.0].canonical_url(), "dropping circular import");
                continue;
            }
            kept.push(up);
        }
        Ok(kept)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl DependencyGraph {
    /// Canonicalizes `url` without a base, as [`DependencyGraph::add`] would.
    pub fn canonicalize(&mut self, url: &str) -> Option<Url> {
        self.cache
            .canonicalize(url, None, None)
            .map(|resolved| resolved.canonical_url)
    }

    /// The live node for `canonical_url`.
    pub fn node(&self, canonical_url: &Url) -> Option<&Node> {
        self.by_url.get(canonical_url).map(|id| &self.nodes[id.0])
    }

    pub fn node_id(&self, canonical_url: &Url) -> Option<NodeId> {
        self.by_url.get(canonical_url).copied()
    }

    /// Any node ever constructed, including retired ones.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn contains(&self, canonical_url: &Url) -> bool {
        self.by_url.contains_key(canonical_url)
    }

    /// Whether `id` is still the node registered for its canonical URL.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|node| self.by_url.get(node.canonical_url()) == Some(&id))
    }

    /// Live nodes in construction order.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut ids: Vec<NodeId> = self.by_url.values().copied().collect();
        ids.sort();
        ids.into_iter().map(|id| &self.nodes[id.0]).collect()
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// The stylesheets `canonical_url` imports directly.
    pub fn upstream_of(&self, canonical_url: &Url) -> Vec<&Node> {
        self.node(canonical_url)
            .map(|node| node.upstream().iter().map(|id| &self.nodes[id.0]).collect())
            .unwrap_or_default()
    }

    /// The stylesheets that import `canonical_url` directly.
    pub fn downstream_of(&self, canonical_url: &Url) -> Vec<&Node> {
        self.node(canonical_url)
            .map(|node| {
                node.sorted_downstream()
                    .into_iter()
                    .map(|id| &self.nodes[id.0])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> GraphStats {
        let nodes = self.nodes();
        GraphStats {
            node_count: nodes.len(),
            edge_count: nodes.iter().map(|n| n.upstream().len()).sum(),
            root_count: nodes.iter().filter(|n| n.downstream().is_empty()).count(),
            leaf_count: nodes.iter().filter(|n| n.upstream().is_empty()).count(),
        }
    }

    /// A serializable view of `id` with neighbours named by canonical URL.
    pub fn summary(&self, id: NodeId) -> Option<NodeSummary> {
        let node = self.get(id)?;
        let name = |id: &NodeId| self.nodes[id.0].canonical_url().to_string();
        Some(NodeSummary {
            canonical_url: node.canonical_url().to_string(),
            display_url: node.stylesheet().url().to_string(),
            syntax: node.stylesheet().syntax(),
            upstream: node.upstream().iter().map(name).collect(),
            downstream: node.sorted_downstream().iter().map(name).collect(),
            unresolved: node.unresolved().to_vec(),
        })
    }
}
