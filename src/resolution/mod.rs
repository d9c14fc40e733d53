/// Import resolution.
///
/// Maps the URLs written in import rules to canonical URLs through an ordered
/// list of resolvers, and loads each canonical URL into a parsed stylesheet
/// at most once.
mod cache;
mod filesystem;
mod memory;

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::stylesheet::Syntax;

pub(crate) use cache::original_url;
pub use cache::{ResolutionCache, ResolvedUrl};
pub use filesystem::FilesystemResolver;
pub use memory::MemoryResolver;

/// Raw source handed back by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverResult {
    pub contents: String,
    pub syntax: Syntax,
}

impl ResolverResult {
    pub fn new(contents: impl Into<String>, syntax: Syntax) -> Self {
        Self {
            contents: contents.into(),
            syntax,
        }
    }
}

/// A strategy for locating stylesheets.
///
/// A resolver owns a family of canonical URLs: every canonical URL it
/// returns from [`Resolver::canonicalize`] must be loadable through
/// [`Resolver::load`] on the same resolver, and no two resolvers should
/// claim the same canonical URL.
pub trait Resolver: fmt::Debug {
    /// Maps `url` to the canonical URL of the stylesheet it refers to, or
    /// `None` if this resolver does not recognise it.
    ///
    /// `url` is either absolute or relative to whatever base the resolver
    /// uses for bare paths (a load path, for instance).
    fn canonicalize(&self, url: &str) -> Option<Url>;

    /// Loads the source of a canonical URL previously returned by
    /// [`Resolver::canonicalize`].
    fn load(&self, canonical_url: &Url) -> Option<ResolverResult>;
}

/// Shared handle to a resolver. Identity (not equality) tells resolvers apart.
pub type SharedResolver = Arc<dyn Resolver>;

/// Returns `true` if both handles point at the same resolver.
pub fn same_resolver(a: &SharedResolver, b: &SharedResolver) -> bool {
    Arc::ptr_eq(a, b)
}
