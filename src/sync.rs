use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Compute SHA-256 content hash of stylesheet source.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Find files that exist on disk but are not yet part of the graph.
pub fn find_new_files(known: &HashSet<String>, current_files: &[String]) -> Vec<String> {
    current_files
        .iter()
        .filter(|path| !known.contains(path.as_str()))
        .cloned()
        .collect()
}
