use thiserror::Error;

/// Errors that can occur while resolving, loading, or graphing stylesheets.
#[derive(Error, Debug)]
pub enum StyleGraphError {
    /// A root stylesheet passed to the graph could not be canonicalized or
    /// loaded by any resolver.
    #[error("stylesheet not found at {url}")]
    NotFound { url: String },

    #[error("parse error: {message} (url: {url}, line: {line:?})")]
    Parse {
        message: String,
        url: String,
        line: Option<u32>,
    },

    /// A stylesheet (transitively) imports itself.
    #[error("circular import: {url} is already being loaded")]
    CircularImport { url: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using `StyleGraphError`.
pub type Result<T> = std::result::Result<T, StyleGraphError>;
