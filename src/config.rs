use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StyleGraphError};

/// Name of the configuration file stored inside the `.stylegraph` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory used to store project metadata.
pub const STYLEGRAPH_DIR: &str = ".stylegraph";

/// Configuration for a stylesheet project.
///
/// Controls where imports are looked up, which files are treated as roots,
/// and how strictly the graph is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleGraphConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Root directory of the project.
    pub root_dir: String,
    /// Extra directories searched for imports after the project root, in
    /// priority order. Relative entries are relative to the project root.
    pub load_paths: Vec<String>,
    /// Glob patterns for stylesheets added as roots during a scan.
    pub include: Vec<String>,
    /// Glob patterns for files to skip during a scan.
    pub exclude: Vec<String>,
    /// Maximum file size in bytes; larger files are skipped.
    pub max_file_size: u64,
    /// Whether a circular import is an error (otherwise it is dropped).
    pub detect_cycles: bool,
    /// Whether `@import` rules produce a deprecation warning.
    pub warn_on_import: bool,
}

impl Default for StyleGraphConfig {
    fn default() -> Self {
        Self {
            version: 1,
            root_dir: String::new(),
            load_paths: Vec::new(),
            include: vec![
                "**/*.scss".to_string(),
                "**/*.sass".to_string(),
                "**/*.css".to_string(),
            ],
            exclude: vec![
                ".git/**".to_string(),
                ".stylegraph/**".to_string(),
                "node_modules/**".to_string(),
                "vendor/**".to_string(),
                "**/*.min.*".to_string(),
                "build/**".to_string(),
                "dist/**".to_string(),
            ],
            max_file_size: 1_048_576,
            detect_cycles: true,
            warn_on_import: false,
        }
    }
}

impl StyleGraphConfig {
    /// Load paths as absolute directories, relative ones joined to
    /// `project_root`.
    pub fn load_path_dirs(&self, project_root: &Path) -> Vec<PathBuf> {
        self.load_paths
            .iter()
            .map(|p| {
                let path = Path::new(p);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    project_root.join(path)
                }
            })
            .collect()
    }
}

/// Returns the path to the `.stylegraph` directory within the given project root.
pub fn get_stylegraph_dir(project_root: &Path) -> PathBuf {
    project_root.join(STYLEGRAPH_DIR)
}

/// Returns the path to the configuration file within the `.stylegraph` directory.
pub fn get_config_path(project_root: &Path) -> PathBuf {
    get_stylegraph_dir(project_root).join(CONFIG_FILENAME)
}

/// Loads the configuration from disk.
///
/// If the configuration file does not exist, returns a default configuration
/// with `root_dir` set to the given project root.
pub fn load_config(project_root: &Path) -> Result<StyleGraphConfig> {
    let config_path = get_config_path(project_root);

    if !config_path.exists() {
        return Ok(StyleGraphConfig {
            root_dir: project_root.to_string_lossy().to_string(),
            ..StyleGraphConfig::default()
        });
    }

    let contents =
        fs::read_to_string(&config_path).map_err(config_error("read config file", &config_path))?;
    serde_json::from_str(&contents).map_err(config_error("parse config file", &config_path))
}

/// Saves the configuration to disk using an atomic write.
///
/// Writes to a temporary file first and then renames it into place.
pub fn save_config(project_root: &Path, config: &StyleGraphConfig) -> Result<()> {
    let stylegraph_dir = get_stylegraph_dir(project_root);
    fs::create_dir_all(&stylegraph_dir).map_err(config_error("create directory", &stylegraph_dir))?;

    let config_path = get_config_path(project_root);
    let tmp_path = config_path.with_extension("tmp");

    let json = serde_json::to_string_pretty(config)?;
    fs::write(&tmp_path, &json).map_err(config_error("write temporary config file", &tmp_path))?;
    fs::rename(&tmp_path, &config_path).map_err(config_error("replace config file", &config_path))?;

    Ok(())
}

/// Wraps an I/O or JSON failure on `path` as [`StyleGraphError::Config`].
fn config_error<'a, E: std::fmt::Display>(
    action: &'a str,
    path: &'a Path,
) -> impl FnOnce(E) -> StyleGraphError + 'a {
    move |e| StyleGraphError::Config {
        message: format!("failed to {action} '{}': {e}", path.display()),
    }
}

/// Determines whether a file should be added as a root based on the
/// configuration's include and exclude glob patterns.
///
/// Exclude patterns take precedence.
pub fn should_include_file(file_path: &str, config: &StyleGraphConfig) -> bool {
    let match_opts = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let matches = |patterns: &[String]| {
        patterns.iter().any(|p| {
            Pattern::new(p)
                .map(|pattern| pattern.matches_with(file_path, match_opts))
                .unwrap_or(false)
        })
    };

    !matches(&config.exclude) && matches(&config.include)
}
