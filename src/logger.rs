//! Sink for diagnostics emitted while parsing stylesheets.

use std::fmt;

use url::Url;

/// Receives warnings produced by the stylesheet parser.
///
/// The resolution layer never interprets these messages; it only forwards
/// them to whichever logger the cache was built with.
pub trait Logger: fmt::Debug {
    /// Reports a warning, optionally attributed to a stylesheet URL.
    fn warn(&self, message: &str, url: Option<&Url>);

    /// Reports a debug message.
    fn debug(&self, message: &str, url: Option<&Url>);
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn warn(&self, message: &str, url: Option<&Url>) {
        match url {
            Some(url) => tracing::warn!(%url, "{message}"),
            None => tracing::warn!("{message}"),
        }
    }

    fn debug(&self, message: &str, url: Option<&Url>) {
        match url {
            Some(url) => tracing::debug!(%url, "{message}"),
            None => tracing::debug!("{message}"),
        }
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn warn(&self, _message: &str, _url: Option<&Url>) {}

    fn debug(&self, _message: &str, _url: Option<&Url>) {}
}
