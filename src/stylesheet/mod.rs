/// Default parser that scans stylesheets for module-loading rules.
pub mod parser;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::sync::content_hash;

pub use parser::{RuleParser, StylesheetParser};

/// Surface syntax a stylesheet is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Syntax {
    /// Brace-and-semicolon syntax (`.scss`).
    Scss,
    /// Whitespace-sensitive syntax (`.sass`).
    Indented,
    /// Plain CSS. Every `@import` is passed through to the output.
    Css,
}

impl Syntax {
    /// Returns the string representation of this syntax.
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Scss => "scss",
            Syntax::Indented => "indented",
            Syntax::Css => "css",
        }
    }

    /// Picks a syntax from a file extension, defaulting to SCSS.
    pub fn for_path(path: &str) -> Syntax {
        if path.ends_with(".sass") {
            Syntax::Indented
        } else if path.ends_with(".css") {
            Syntax::Css
        } else {
            Syntax::Scss
        }
    }
}

/// A single target of an `@import` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// An import that loads another stylesheet.
    Dynamic(String),
    /// A plain-CSS import left in the output as-is.
    Static(String),
}

/// An at-rule recognised by the parser, top-level or nested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Use { url: String, line: u32 },
    Forward { url: String, line: u32 },
    Import { targets: Vec<ImportTarget>, line: u32 },
    /// Any other at-rule (`@mixin`, `@media`, ...), by name.
    Other { name: String, line: u32 },
}

/// The parsed form of one stylesheet.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    url: Url,
    syntax: Syntax,
    rules: Vec<Rule>,
    content_hash: String,
}

impl Stylesheet {
    pub fn new(url: Url, syntax: Syntax, rules: Vec<Rule>, contents: &str) -> Self {
        Self {
            url,
            syntax,
            rules,
            content_hash: content_hash(contents),
        }
    }

    /// The display URL used in diagnostics.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// SHA-256 of the source text this stylesheet was parsed from.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns the URLs of every module this stylesheet loads, in source
    /// order, exactly as written.
    ///
    /// Covers `@use`, `@forward` and dynamic `@import` targets. Plain-CSS
    /// imports are not dependencies.
    pub fn dependencies(&self) -> Vec<String> {
        let mut urls = Vec::new();
        for rule in &self.rules {
            match rule {
                Rule::Use { url, .. } | Rule::Forward { url, .. } => urls.push(url.clone()),
                Rule::Import { targets, .. } => {
                    for target in targets {
                        if let ImportTarget::Dynamic(url) = target {
                            urls.push(url.clone());
                        }
                    }
                }
                Rule::Other { .. } => {}
            }
        }
        urls
    }
}
