use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::config::{get_stylegraph_dir, load_config, save_config, should_include_file, StyleGraphConfig};
use crate::errors::{Result, StyleGraphError};
use crate::graph::DependencyGraph;
use crate::resolution::{FilesystemResolver, ResolutionCache, SharedResolver};
use crate::stylesheet::RuleParser;
use crate::sync;
use crate::types::ReloadOutcome;

/// A directory of stylesheets and the dependency graph built from it.
#[derive(Debug)]
pub struct Project {
    graph: DependencyGraph,
    config: StyleGraphConfig,
    project_root: PathBuf,
}

/// Result of a full indexing operation.
#[derive(Debug)]
pub struct IndexResult {
    /// Number of files scanned and added as roots.
    pub file_count: usize,
    /// Number of stylesheets in the graph afterwards.
    pub node_count: usize,
    /// Number of import edges in the graph afterwards.
    pub edge_count: usize,
    /// Files that could not be added, with the reason.
    pub failures: Vec<(String, String)>,
    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

/// Result of an incremental sync operation.
#[derive(Debug)]
pub struct SyncResult {
    /// Number of newly added files.
    pub files_added: usize,
    /// Number of stylesheets whose source changed.
    pub files_modified: usize,
    /// Number of stylesheets that no longer exist.
    pub files_removed: usize,
    /// Number of stylesheets whose pending imports were linked once new
    /// files had been added.
    pub imports_relinked: usize,
    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl Project {
    /// Writes a default configuration for `project_root` and opens it.
    pub fn init(project_root: &Path) -> Result<Self> {
        let config = StyleGraphConfig {
            root_dir: project_root.to_string_lossy().to_string(),
            ..StyleGraphConfig::default()
        };
        save_config(project_root, &config)?;
        Self::open(project_root)
    }

    /// Opens the project at `project_root`, falling back to the default
    /// configuration when none has been saved. The graph starts empty.
    pub fn open(project_root: &Path) -> Result<Self> {
        let project_root = project_root.canonicalize().map_err(|e| StyleGraphError::Config {
            message: format!(
                "project root '{}' is not accessible: {}",
                project_root.display(),
                e
            ),
        })?;
        let config = load_config(&project_root)?;
        let graph = build_graph(&config, &project_root);
        Ok(Self {
            graph,
            config,
            project_root,
        })
    }

    /// Returns `true` if a configuration has been saved under the given root.
    pub fn is_initialized(project_root: &Path) -> bool {
        get_stylegraph_dir(project_root).exists()
    }
}

/// One filesystem resolver for the project root, then one per load path.
fn build_graph(config: &StyleGraphConfig, project_root: &Path) -> DependencyGraph {
    let mut resolvers: Vec<SharedResolver> = vec![Arc::new(FilesystemResolver::new(project_root))];
    for dir in config.load_path_dirs(project_root) {
        resolvers.push(Arc::new(FilesystemResolver::new(dir)));
    }
    let parser = RuleParser::new().with_import_warnings(config.warn_on_import);
    let cache = ResolutionCache::new(resolvers).with_parser(parser);
    DependencyGraph::new(cache).with_cycle_detection(config.detect_cycles)
}

// ---------------------------------------------------------------------------
// Indexing
// ---------------------------------------------------------------------------

impl Project {
    /// Rebuilds the graph from scratch, adding every included stylesheet as
    /// a root.
    ///
    /// A file that fails to load or parse is recorded in
    /// [`IndexResult::failures`] and does not stop the scan.
    pub fn index_all(&mut self) -> Result<IndexResult> {
        let start = Instant::now();
        self.graph = build_graph(&self.config, &self.project_root);

        let files = self.scan_files()?;
        let mut failures = Vec::new();
        for file_path in &files {
            if let Err(e) = self.graph.add(file_path) {
                warn!(file = %file_path, error = %e, "failed to add stylesheet");
                failures.push((file_path.clone(), e.to_string()));
            }
        }

        let stats = self.graph.stats();
        info!(files = files.len(), nodes = stats.node_count, "indexed project");
        Ok(IndexResult {
            file_count: files.len(),
            node_count: stats.node_count,
            edge_count: stats.edge_count,
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Brings the graph up to date with the files on disk: reloads every
    /// stylesheet (re-resolving the imports of those that changed, evicting
    /// those that vanished), adds new files as roots, and links imports
    /// whose targets have appeared since the last index.
    pub fn sync(&mut self) -> Result<SyncResult> {
        let start = Instant::now();
        let mut files_modified = 0;
        let mut files_removed = 0;

        // Files created since the last index were cached as misses.
        self.graph.cache_mut().clear_misses();

        let urls: Vec<Url> = self
            .graph
            .nodes()
            .iter()
            .map(|node| node.canonical_url().clone())
            .collect();
        for url in &urls {
            if !self.graph.contains(url) {
                continue;
            }
            match self.graph.reload(url) {
                Ok(ReloadOutcome::Updated) => files_modified += 1,
                Ok(ReloadOutcome::Removed) => files_removed += 1,
                Ok(ReloadOutcome::Unchanged) => {}
                Err(e) => warn!(url = %url, error = %e, "failed to reload stylesheet"),
            }
        }

        let current_files = self.scan_files()?;
        let mut known = HashSet::new();
        for path in &current_files {
            if let Some(url) = self.graph.canonicalize(path) {
                if self.graph.contains(&url) {
                    known.insert(path.clone());
                }
            }
        }

        let mut files_added = 0;
        for path in sync::find_new_files(&known, &current_files) {
            match self.graph.add(&path) {
                Ok(_) => files_added += 1,
                Err(e) => warn!(file = %path, error = %e, "failed to add stylesheet"),
            }
        }
        let imports_relinked = self.graph.resolve_pending();

        info!(
            added = files_added,
            modified = files_modified,
            removed = files_removed,
            relinked = imports_relinked,
            "synced project"
        );
        Ok(SyncResult {
            files_added,
            files_modified,
            files_removed,
            imports_relinked,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Scans the project root for stylesheets, respecting the configured
    /// include/exclude patterns and max file size.
    fn scan_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.project_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Ok(relative) = path.strip_prefix(&self.project_root) {
                let rel_str = relative.to_string_lossy().to_string();
                if should_include_file(&rel_str, &self.config) {
                    if let Ok(metadata) = std::fs::metadata(path) {
                        if metadata.len() <= self.config.max_file_size {
                            files.push(rel_str);
                        }
                    }
                }
            }
        }
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// Query delegation
// ---------------------------------------------------------------------------

impl Project {
    /// Canonical URL of a file given relative to the project root (or as a
    /// `file:` URL).
    pub fn canonical_url(&mut self, file: &str) -> Result<Url> {
        self.graph
            .canonicalize(file)
            .ok_or_else(|| StyleGraphError::NotFound {
                url: file.to_string(),
            })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    /// Returns a reference to the current configuration.
    pub fn get_config(&self) -> &StyleGraphConfig {
        &self.config
    }

    /// Returns the project root path.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
