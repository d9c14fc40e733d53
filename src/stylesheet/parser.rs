use std::fmt;

use tree_sitter::{Node as TsNode, Parser, Tree};
use url::Url;

use crate::errors::{Result, StyleGraphError};
use crate::logger::Logger;
use crate::stylesheet::{ImportTarget, Rule, Stylesheet, Syntax};

/// Turns source text into a [`Stylesheet`].
pub trait StylesheetParser: fmt::Debug {
    /// Parses `contents` written in `syntax`.
    ///
    /// `url` is the display URL recorded on the result and used in error
    /// messages. Warnings go to `logger`.
    fn parse(
        &self,
        contents: &str,
        syntax: Syntax,
        url: &Url,
        logger: &dyn Logger,
    ) -> Result<Stylesheet>;
}

/// Tree-sitter based parser that records the at-rules of a stylesheet and
/// reads the module-loading ones (`@use`, `@forward`, `@import`).
///
/// SCSS and plain CSS go straight to the CSS grammar. Indented sources are
/// first rewritten line for line into braces and semicolons, so line numbers
/// survive.
#[derive(Debug, Clone, Default)]
pub struct RuleParser {
    warn_on_import: bool,
}

/// One leaf of the syntax tree. Strings count as a single leaf; comments are
/// dropped.
#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    line: u32,
}

impl RuleParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a deprecation warning for every `@import` that loads a module.
    pub fn with_import_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_import = enabled;
        self
    }

    fn parse_source(source: &str) -> std::result::Result<Tree, String> {
        let mut parser = Parser::new();
        let language = tree_sitter_css::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|e| format!("failed to load CSS grammar: {e}"))?;
        parser
            .parse(source, None)
            .ok_or_else(|| "tree-sitter parse returned None".to_string())
    }
}

impl StylesheetParser for RuleParser {
    fn parse(
        &self,
        contents: &str,
        syntax: Syntax,
        url: &Url,
        logger: &dyn Logger,
    ) -> Result<Stylesheet> {
        let rewritten;
        let source = match syntax {
            Syntax::Indented => {
                rewritten = indented_to_scss(contents);
                rewritten.as_str()
            }
            Syntax::Scss | Syntax::Css => contents,
        };

        let tree = Self::parse_source(source).map_err(|message| StyleGraphError::Parse {
            message,
            url: url.to_string(),
            line: None,
        })?;
        let mut tokens = Vec::new();
        collect_tokens(tree.root_node(), source, &mut tokens);

        let rules = scan_rules(&tokens, source, syntax, url)?;
        if self.warn_on_import {
            for rule in &rules {
                if let Rule::Import { targets, line } = rule {
                    if targets.iter().any(|t| matches!(t, ImportTarget::Dynamic(_))) {
                        logger.warn(
                            &format!(
                                "line {line}: @import rules are deprecated, use @use or @forward instead"
                            ),
                            Some(url),
                        );
                    }
                }
            }
        }

        logger.debug(&format!("found {} at-rules", rules.len()), Some(url));
        Ok(Stylesheet::new(url.clone(), syntax, rules, contents))
    }
}

fn parse_error(message: &str, url: &Url, line: u32) -> StyleGraphError {
    StyleGraphError::Parse {
        message: message.to_string(),
        url: url.to_string(),
        line: Some(line),
    }
}

/// Flattens the tree into leaves in source order.
fn collect_tokens<'a>(node: TsNode<'_>, source: &'a str, tokens: &mut Vec<Token<'a>>) {
    match node.kind() {
        "comment" | "js_comment" => return,
        "string_value" => {}
        _ if node.child_count() > 0 => {
            let mut cursor = node.walk();
            if cursor.goto_first_child() {
                loop {
                    collect_tokens(cursor.node(), source, tokens);
                    if !cursor.goto_next_sibling() {
                        break;
                    }
                }
            }
            return;
        }
        _ => {}
    }

    if node.is_missing() || node.start_byte() == node.end_byte() {
        return;
    }
    if let Some(text) = source.get(node.start_byte()..node.end_byte()) {
        tokens.push(Token {
            text,
            start: node.start_byte(),
            end: node.end_byte(),
            line: node.start_position().row as u32 + 1,
        });
    }
}

/// Walks the leaves for at-keywords and turns each into a [`Rule`].
fn scan_rules(tokens: &[Token<'_>], source: &str, syntax: Syntax, url: &Url) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let Some(name) = at_keyword(token.text) else {
            continue;
        };
        let line = token.line;
        let rule = match name {
            "use" | "forward" | "import" => {
                let end = statement_end(&tokens[i + 1..]).unwrap_or(source.len());
                let prelude = source.get(token.end..end).unwrap_or("").trim();
                parse_rule(name, prelude, syntax, url, line)?
            }
            _ => Rule::Other {
                name: name.to_string(),
                line,
            },
        };
        rules.push(rule);
    }
    Ok(rules)
}

/// The name of an at-keyword leaf such as `@use`.
fn at_keyword(text: &str) -> Option<&str> {
    let name = text.strip_prefix('@')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(name)
}

/// Byte offset of the first `;`, `{` or `}` outside parentheses.
fn statement_end(tokens: &[Token<'_>]) -> Option<usize> {
    let mut depth = 0usize;
    for token in tokens {
        match token.text {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            ";" | "{" | "}" if depth == 0 => return Some(token.start),
            _ => {}
        }
    }
    None
}

fn parse_rule(name: &str, prelude: &str, syntax: Syntax, url: &Url, line: u32) -> Result<Rule> {
    match name {
        "use" | "forward" => {
            if syntax == Syntax::Css {
                return Err(parse_error(
                    &format!("@{name} rules aren't allowed in plain CSS"),
                    url,
                    line,
                ));
            }
            let target = module_url(prelude, url, line)?;
            Ok(if name == "use" {
                Rule::Use { url: target, line }
            } else {
                Rule::Forward { url: target, line }
            })
        }
        _ => {
            if prelude.is_empty() {
                return Err(parse_error("expected URL", url, line));
            }
            let mut targets = Vec::new();
            for item in split_commas(prelude) {
                targets.push(parse_import_target(item, syntax, url, line)?);
            }
            Ok(Rule::Import { targets, line })
        }
    }
}

/// The quoted URL at the start of a `@use` or `@forward` prelude.
fn module_url(prelude: &str, url: &Url, line: u32) -> Result<String> {
    if !prelude.starts_with(['"', '\'']) {
        return Err(parse_error("expected string", url, line));
    }
    leading_string(prelude)
        .map(|(value, _)| value)
        .ok_or_else(|| parse_error("unterminated string", url, line))
}

fn parse_import_target(item: &str, syntax: Syntax, url: &Url, line: u32) -> Result<ImportTarget> {
    let item = item.trim();
    if item.is_empty() {
        return Err(parse_error("expected URL", url, line));
    }

    if item.starts_with(['"', '\'']) {
        let (value, remainder) =
            leading_string(item).ok_or_else(|| parse_error("unterminated string", url, line))?;
        // Trailing media queries or supports() make this a plain CSS import.
        if syntax == Syntax::Css || !remainder.trim().is_empty() || is_plain_css_url(&value) {
            return Ok(ImportTarget::Static(item.to_string()));
        }
        return Ok(ImportTarget::Dynamic(value));
    }

    if item.starts_with("url(") {
        return Ok(ImportTarget::Static(item.to_string()));
    }

    if syntax == Syntax::Indented {
        if is_plain_css_url(item) || item.contains(char::is_whitespace) {
            return Ok(ImportTarget::Static(item.to_string()));
        }
        return Ok(ImportTarget::Dynamic(item.to_string()));
    }

    Err(parse_error("expected string", url, line))
}

/// Reads a quoted string at the start of `text`, returning its unescaped
/// value and whatever follows the closing quote.
fn leading_string(text: &str) -> Option<(String, &str)> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut value = String::new();
    let mut escaped = false;

    for (offset, c) in text.char_indices().skip(1) {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '\n' {
            return None;
        } else if c == quote {
            return Some((value, &text[offset + c.len_utf8()..]));
        } else {
            value.push(c);
        }
    }
    None
}

/// Splits an `@import` prelude on commas outside strings and parentheses.
fn split_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (offset, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_plain_css_url(url: &str) -> bool {
    url.ends_with(".css")
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
}

/// Rewrites indented syntax as SCSS, keeping every line where it was.
///
/// A `//` or `/*` comment swallows the lines indented beneath it. Every
/// other line becomes a statement: it opens a block when the next code line
/// is indented deeper, and ends in `;` otherwise. Blocks close in front of
/// the first line that is not indented past them.
fn indented_to_scss(contents: &str) -> String {
    let mut code: Vec<Option<(usize, &str)>> = Vec::new();
    let mut comment_indent: Option<usize> = None;

    for line in contents.lines() {
        let text = line.trim_start();
        let indent = line.len() - text.len();
        if text.is_empty() {
            code.push(None);
            continue;
        }
        if let Some(outer) = comment_indent {
            if indent > outer {
                code.push(None);
                continue;
            }
            comment_indent = None;
        }
        if text.starts_with("//") || text.starts_with("/*") {
            comment_indent = Some(indent);
            code.push(None);
            continue;
        }
        code.push(Some((indent, text.trim_end())));
    }

    let mut out = String::with_capacity(contents.len() + code.len() * 2);
    let mut open: Vec<usize> = Vec::new();
    for (i, entry) in code.iter().enumerate() {
        if let Some((indent, text)) = *entry {
            while open.last().is_some_and(|&outer| outer >= indent) {
                open.pop();
                out.push('}');
            }
            out.push_str(text);
            let next_indent = code[i + 1..].iter().flatten().next().map(|(n, _)| *n);
            if next_indent.is_some_and(|n| n > indent) {
                out.push_str(" {");
                open.push(indent);
            } else {
                out.push(';');
            }
        }
        out.push('\n');
    }
    for _ in open {
        out.push('}');
    }
    out
}
