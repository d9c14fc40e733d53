use std::fs;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};
use url::Url;

use crate::resolution::{Resolver, ResolverResult};
use crate::stylesheet::Syntax;

/// Extensions tried, in order, for an import without one.
const EXTENSIONS: [&str; 2] = ["sass", "scss"];

/// Resolves stylesheets on disk relative to a root directory.
///
/// Follows the usual Sass lookup rules: `@use "foo"` may refer to
/// `foo.sass`, `foo.scss`, the partials `_foo.sass`/`_foo.scss`, `foo.css`,
/// or an index file inside a `foo/` directory. If more than one candidate
/// exists the import is ambiguous and is treated as unresolved.
#[derive(Debug, Clone)]
pub struct FilesystemResolver {
    root: PathBuf,
}

impl FilesystemResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, url: &str) -> Option<PathBuf> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
            Ok(_) => None,
            Err(_) => Some(self.root.join(url)),
        }
    }
}

impl Resolver for FilesystemResolver {
    fn canonicalize(&self, url: &str) -> Option<Url> {
        let path = self.path_for(url)?;
        let found = resolve_import_path(&path)?;
        let real = fs::canonicalize(&found).ok()?;
        let canonical = Url::from_file_path(&real).ok()?;
        trace!(url, canonical = %canonical, "filesystem canonicalize");
        Some(canonical)
    }

    fn load(&self, canonical_url: &Url) -> Option<ResolverResult> {
        let path = canonical_url.to_file_path().ok()?;
        let contents = fs::read_to_string(&path).ok()?;
        let syntax = Syntax::for_path(&path.to_string_lossy());
        Some(ResolverResult { contents, syntax })
    }
}

/// Finds the file `path` refers to under the Sass lookup rules.
fn resolve_import_path(path: &Path) -> Option<PathBuf> {
    let extension = path.extension().and_then(|e| e.to_str());
    if matches!(extension, Some("sass" | "scss" | "css")) {
        return exactly_one(try_path(path));
    }

    if let Some(found) = try_path_with_extensions(path) {
        return Some(found);
    }

    if path.is_dir() {
        return try_path_with_extensions(&path.join("index"));
    }

    None
}

/// Tries `path.sass` and `path.scss` (with partials), falling back to
/// `path.css`.
fn try_path_with_extensions(path: &Path) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    for extension in EXTENSIONS {
        candidates.extend(try_path(&with_extension(path, extension)));
    }
    if candidates.is_empty() {
        candidates = try_path(&with_extension(path, "css"));
    }
    exactly_one(candidates)
}

/// Returns whichever of `path` and its partial form exist as files.
fn try_path(path: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if !name.starts_with('_') {
            let partial = path.with_file_name(format!("_{name}"));
            if partial.is_file() {
                found.push(partial);
            }
        }
    }
    if path.is_file() {
        found.push(path.to_path_buf());
    }
    found
}

fn exactly_one(mut candidates: Vec<PathBuf>) -> Option<PathBuf> {
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            let names: Vec<String> = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            warn!("ambiguous import matches {}", names.join(", "));
            None
        }
    }
}

/// Appends an extension, keeping any dots already in the file name.
fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(extension);
    PathBuf::from(os)
}
