use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};
use url::{ParseError, Url};

use crate::errors::Result;
use crate::logger::{Logger, TracingLogger};
use crate::resolution::{same_resolver, SharedResolver};
use crate::stylesheet::{RuleParser, Stylesheet, StylesheetParser};

/// The outcome of a successful canonicalization: which resolver claimed the
/// URL and the canonical URL it produced.
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    pub resolver: SharedResolver,
    pub canonical_url: Url,
}

impl PartialEq for ResolvedUrl {
    fn eq(&self, other: &Self) -> bool {
        same_resolver(&self.resolver, &other.resolver) && self.canonical_url == other.canonical_url
    }
}

/// Memoizes canonicalization and loading across an ordered list of
/// resolvers.
///
/// Both caches are populated lazily and permanently: a URL that no resolver
/// recognises is remembered as a miss and never retried, and a canonical URL
/// is loaded and parsed at most once. Parse errors are the exception; they
/// are returned to the caller without touching the cache, so a later request
/// for the same canonical URL tries again.
///
/// Loaded stylesheets are keyed by canonical URL alone, so the cache relies
/// on no two resolvers claiming the same canonical URL.
#[derive(Debug)]
pub struct ResolutionCache {
    /// Resolvers in priority order, highest first.
    resolvers: Vec<SharedResolver>,
    parser: Box<dyn StylesheetParser>,
    logger: Arc<dyn Logger>,
    /// Non-contextual canonicalizations keyed by the URL as written.
    canonicalize_cache: HashMap<String, Option<ResolvedUrl>>,
    /// Loaded stylesheets keyed by canonical URL.
    import_cache: HashMap<Url, Option<Arc<Stylesheet>>>,
    /// The display URL each canonical URL was first loaded under.
    display_urls: HashMap<Url, Url>,
}

impl ResolutionCache {
    /// Creates a cache that consults `resolvers` in order.
    pub fn new(resolvers: Vec<SharedResolver>) -> Self {
        Self {
            resolvers,
            parser: Box::new(RuleParser::new()),
            logger: Arc::new(TracingLogger),
            canonicalize_cache: HashMap::new(),
            import_cache: HashMap::new(),
            display_urls: HashMap::new(),
        }
    }

    /// A cache with no resolvers. Every non-contextual lookup misses.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    /// Replaces the parser used to turn loaded sources into stylesheets.
    pub fn with_parser(mut self, parser: impl StylesheetParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Replaces the logger that receives parser warnings.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn resolvers(&self) -> &[SharedResolver] {
        &self.resolvers
    }

    /// Canonicalizes `url`.
    ///
    /// When `base_resolver` and `base_url` are both given and `url` is
    /// relative, `base_resolver` is asked first with `url` resolved against
    /// `base_url`. That lookup is never cached, since the same relative URL
    /// means different files in different contexts. Otherwise the registered
    /// resolvers are tried in order and the first match (or the lack of one)
    /// is cached under `url`.
    pub fn canonicalize(
        &mut self,
        url: &str,
        base_resolver: Option<&SharedResolver>,
        base_url: Option<&Url>,
    ) -> Option<ResolvedUrl> {
        if let (Some(resolver), Some(base)) = (base_resolver, base_url) {
            if is_relative(url) {
                if let Some(resolved) = self.canonicalize_relative(url, resolver, base) {
                    return Some(resolved);
                }
            }
        }

        if let Some(cached) = self.canonicalize_cache.get(url) {
            trace!(url, hit = cached.is_some(), "canonicalize cache hit");
            return cached.clone();
        }

        let resolved = self.resolvers.iter().find_map(|resolver| {
            resolver
                .canonicalize(url)
                .map(|canonical_url| ResolvedUrl {
                    resolver: Arc::clone(resolver),
                    canonical_url,
                })
        });

        match &resolved {
            Some(r) => debug!(url, canonical = %r.canonical_url, "canonicalized"),
            None => debug!(url, "no resolver recognised url"),
        }
        self.canonicalize_cache
            .insert(url.to_string(), resolved.clone());
        resolved
    }

    fn canonicalize_relative(
        &self,
        url: &str,
        resolver: &SharedResolver,
        base: &Url,
    ) -> Option<ResolvedUrl> {
        let joined = base.join(url).ok()?;
        let canonical_url = resolver.canonicalize(joined.as_str())?;
        trace!(url, base = %base, canonical = %canonical_url, "canonicalized relative to base");
        Some(ResolvedUrl {
            resolver: Arc::clone(resolver),
            canonical_url,
        })
    }

    /// Loads and parses the stylesheet at `canonical_url` through `resolver`.
    ///
    /// Returns `Ok(None)` if the resolver cannot load it; that miss is
    /// cached. The stylesheet's display URL is `original_url` with the
    /// canonical URL's basename substituted in, or the canonical URL itself
    /// when there is no original.
    pub fn load(
        &mut self,
        resolver: &SharedResolver,
        canonical_url: &Url,
        original_url: Option<&Url>,
    ) -> Result<Option<Arc<Stylesheet>>> {
        if let Some(cached) = self.import_cache.get(canonical_url) {
            trace!(canonical = %canonical_url, "import cache hit");
            return Ok(cached.clone());
        }

        let Some(result) = resolver.load(canonical_url) else {
            debug!(canonical = %canonical_url, "resolver could not load canonical url");
            self.import_cache.insert(canonical_url.clone(), None);
            return Ok(None);
        };

        let display_url = display_url(canonical_url, original_url);
        let stylesheet = self.parser.parse(
            &result.contents,
            result.syntax,
            &display_url,
            self.logger.as_ref(),
        )?;

        debug!(
            canonical = %canonical_url,
            display = %display_url,
            syntax = result.syntax.as_str(),
            "loaded stylesheet"
        );
        let stylesheet = Arc::new(stylesheet);
        self.import_cache
            .insert(canonical_url.clone(), Some(Arc::clone(&stylesheet)));
        self.display_urls.insert(canonical_url.clone(), display_url);
        Ok(Some(stylesheet))
    }

    /// Canonicalizes and then loads `url`.
    ///
    /// # Panics
    ///
    /// Panics if `url` cannot be canonicalized. Callers must only use this
    /// for URLs they already know resolve.
    pub fn import(
        &mut self,
        url: &str,
        base_resolver: Option<&SharedResolver>,
        base_url: Option<&Url>,
    ) -> Result<Option<(SharedResolver, Arc<Stylesheet>)>> {
        let resolved = self
            .canonicalize(url, base_resolver, base_url)
            .unwrap_or_else(|| panic!("import of {url} requires a resolvable url"));
        let original_url = original_url(url, base_url);
        let stylesheet = self.load(
            &resolved.resolver,
            &resolved.canonical_url,
            original_url.as_ref(),
        )?;
        Ok(stylesheet.map(|s| (resolved.resolver, s)))
    }

    /// Forgets the non-contextual canonicalization of `url`.
    pub fn clear_canonicalize(&mut self, url: &str) {
        self.canonicalize_cache.remove(url);
    }

    /// Forgets the stylesheet loaded for `canonical_url` so the next
    /// [`ResolutionCache::load`] asks the resolver again.
    pub fn clear_import(&mut self, canonical_url: &Url) {
        self.import_cache.remove(canonical_url);
        self.display_urls.remove(canonical_url);
    }

    /// Forgets every cached failure (canonicalization misses and load
    /// misses) and keeps the successful entries.
    pub fn clear_misses(&mut self) {
        self.canonicalize_cache.retain(|_, resolved| resolved.is_some());
        self.import_cache.retain(|_, stylesheet| stylesheet.is_some());
    }

    /// Returns the human-facing URL `canonical_url` was loaded under.
    pub fn humanize(&self, canonical_url: &Url) -> Url {
        self.display_urls
            .get(canonical_url)
            .cloned()
            .unwrap_or_else(|| canonical_url.clone())
    }
}

/// The absolute URL an import was written as, if it can be expressed as one.
pub(crate) fn original_url(url: &str, base_url: Option<&Url>) -> Option<Url> {
    match base_url {
        Some(base) => base.join(url).ok(),
        None => Url::parse(url).ok(),
    }
}

fn is_relative(url: &str) -> bool {
    matches!(Url::parse(url), Err(ParseError::RelativeUrlWithoutBase))
}

fn display_url(canonical_url: &Url, original_url: Option<&Url>) -> Url {
    let Some(original) = original_url else {
        return canonical_url.clone();
    };
    let basename = canonical_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty());
    match basename {
        // "./" keeps a basename containing ':' from parsing as a scheme.
        Some(basename) => original
            .join(&format!("./{basename}"))
            .unwrap_or_else(|_| canonical_url.clone()),
        None => canonical_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_have_no_scheme() {
        assert!(is_relative("./b"));
        assert!(is_relative("b"));
        assert!(is_relative("../lib/_c.scss"));
        assert!(!is_relative("pkg:foo"));
        assert!(!is_relative("file:///a/b.scss"));
    }

    #[test]
    fn display_url_substitutes_canonical_basename() {
        let canonical = Url::parse("file:///project/styles/_buttons.scss").unwrap();
        let original = Url::parse("file:///project/styles/buttons").unwrap();
        assert_eq!(
            display_url(&canonical, Some(&original)).as_str(),
            "file:///project/styles/_buttons.scss"
        );
    }

    #[test]
    fn display_url_keeps_the_original_directory() {
        let canonical = Url::parse("file:///real/location/_theme.scss").unwrap();
        let original = Url::parse("pkg:///aliases/theme").unwrap();
        assert_eq!(
            display_url(&canonical, Some(&original)).as_str(),
            "pkg:///aliases/_theme.scss"
        );
    }

    #[test]
    fn display_url_defaults_to_canonical() {
        let canonical = Url::parse("file:///a.scss").unwrap();
        assert_eq!(display_url(&canonical, None), canonical);
    }
}
