use std::collections::HashMap;

use tracing::warn;
use url::Url;

use crate::resolution::{Resolver, ResolverResult};
use crate::stylesheet::Syntax;

/// Serves stylesheets from memory under a single URL scheme.
///
/// Files are registered by path. `scheme:path`, `scheme:/path` and
/// `scheme:///path` all name the same file, and the canonical form is always
/// `scheme:///path` so that relative imports can be joined against it. As on
/// disk, an import may omit the extension or the leading underscore of a
/// partial.
#[derive(Debug, Clone)]
pub struct MemoryResolver {
    scheme: String,
    files: HashMap<String, ResolverResult>,
}

impl MemoryResolver {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            files: HashMap::new(),
        }
    }

    /// Registers a file, picking its syntax from the extension.
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.insert(path, contents, Syntax::for_path(path));
        self
    }

    /// Registers or replaces a file.
    pub fn insert(&mut self, path: &str, contents: &str, syntax: Syntax) {
        self.files.insert(
            path.trim_start_matches('/').to_string(),
            ResolverResult::new(contents, syntax),
        );
    }

    /// Removes a file, returning whether it existed.
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path.trim_start_matches('/')).is_some()
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Finds the registered file `path` refers to, with the same lookup
    /// order as [`FilesystemResolver`](super::FilesystemResolver).
    fn find(&self, path: &str) -> Option<String> {
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (format!("{dir}/"), name),
            None => (String::new(), path),
        };
        if [".sass", ".scss", ".css"].iter().any(|e| name.ends_with(e)) {
            return exactly_one(self.try_path(&dir, name));
        }

        let candidates = self.try_extensions(&dir, name);
        if !candidates.is_empty() {
            return exactly_one(candidates);
        }
        exactly_one(self.try_extensions(&format!("{path}/"), "index"))
    }

    /// `name.sass` and `name.scss` (with partials), falling back to
    /// `name.css`.
    fn try_extensions(&self, dir: &str, name: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for extension in ["sass", "scss"] {
            candidates.extend(self.try_path(dir, &format!("{name}.{extension}")));
        }
        if candidates.is_empty() {
            candidates = self.try_path(dir, &format!("{name}.css"));
        }
        candidates
    }

    /// Whichever of `name` and its partial form are registered in `dir`.
    fn try_path(&self, dir: &str, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        if !name.starts_with('_') {
            let partial = format!("{dir}_{name}");
            if self.files.contains_key(&partial) {
                found.push(partial);
            }
        }
        let exact = format!("{dir}{name}");
        if self.files.contains_key(&exact) {
            found.push(exact);
        }
        found
    }
}

fn exactly_one(mut candidates: Vec<String>) -> Option<String> {
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            warn!("ambiguous import matches {}", candidates.join(", "));
            None
        }
    }
}

impl Resolver for MemoryResolver {
    fn canonicalize(&self, url: &str) -> Option<Url> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != self.scheme {
            return None;
        }
        let path = parsed.path().trim_start_matches('/');
        let found = self.find(path)?;
        Url::parse(&format!("{}:///{}", self.scheme, found)).ok()
    }

    fn load(&self, canonical_url: &Url) -> Option<ResolverResult> {
        if canonical_url.scheme() != self.scheme {
            return None;
        }
        self.files
            .get(canonical_url.path().trim_start_matches('/'))
            .cloned()
    }
}
