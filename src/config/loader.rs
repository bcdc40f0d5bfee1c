//! Configuration loading and merging for `pages.toml`
//!
//! Projects may drop a `pages.toml` next to their sources to override the
//! default layout. A missing, malformed or invalid file is never fatal: the
//! build proceeds on defaults alone.

use super::schema::{BuildConfig, PathsConfig, ServeConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project-local override file.
pub const CONFIG_FILE: &str = "pages.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse pages.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Top-level shape of a `pages.toml` file.
///
/// All fields are optional; anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    build: Overrides,
}

/// Partial configuration parsed from an override file.
#[derive(Debug, Default, Deserialize)]
struct Overrides {
    src: Option<PathBuf>,
    dist: Option<PathBuf>,
    temp: Option<PathBuf>,
    public: Option<PathBuf>,
    pages_dir: Option<PathBuf>,
    #[serde(default)]
    paths: PathOverrides,
    #[serde(default)]
    serve: ServeOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct PathOverrides {
    style: Option<String>,
    script: Option<String>,
    pages: Option<String>,
    pages_exclude: Option<Vec<String>>,
    images: Option<String>,
    fonts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServeOverrides {
    port: Option<u16>,
    debounce_ms: Option<u64>,
    vendor_route: Option<String>,
    vendor_dir: Option<PathBuf>,
}

/// Load the configuration for a project root.
///
/// Starts from the built-in defaults and, if `<root>/pages.toml` exists and
/// both parses and validates, merges its fields over them. Failure to load
/// the override is deliberately indistinguishable from its absence.
///
/// The historical behavior of this pipeline dropped the loaded override on
/// the floor and always built with defaults; here loaded fields win.
pub fn load_config(root: &Path) -> BuildConfig {
    match try_load_override(&root.join(CONFIG_FILE)) {
        Ok(Some(config)) => config,
        Ok(None) | Err(_) => BuildConfig::default(),
    }
}

/// Load and merge an override file, surfacing errors.
///
/// Returns `Ok(None)` when the file does not exist. Used by `load_config`
/// (which swallows the error case) and by callers that want to report why
/// an override was ignored.
pub fn try_load_override(path: &Path) -> Result<Option<BuildConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let parsed: OverrideFile = toml::from_str(&contents)?;

    let config = merge_overrides(BuildConfig::default(), parsed.build);
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }

    Ok(Some(config))
}

/// Merge override fields over a base configuration, field by field.
fn merge_overrides(base: BuildConfig, over: Overrides) -> BuildConfig {
    let paths = PathsConfig {
        style: over.paths.style.unwrap_or(base.paths.style),
        script: over.paths.script.unwrap_or(base.paths.script),
        pages: over.paths.pages.unwrap_or(base.paths.pages),
        pages_exclude: over.paths.pages_exclude.unwrap_or(base.paths.pages_exclude),
        images: over.paths.images.unwrap_or(base.paths.images),
        fonts: over.paths.fonts.unwrap_or(base.paths.fonts),
    };
    let serve = ServeConfig {
        port: over.serve.port.unwrap_or(base.serve.port),
        debounce_ms: over.serve.debounce_ms.unwrap_or(base.serve.debounce_ms),
        vendor_route: over.serve.vendor_route.unwrap_or(base.serve.vendor_route),
        vendor_dir: over.serve.vendor_dir.unwrap_or(base.serve.vendor_dir),
    };

    BuildConfig {
        src: over.src.unwrap_or(base.src),
        dist: over.dist.unwrap_or(base.dist),
        temp: over.temp.unwrap_or(base.temp),
        public: over.public.unwrap_or(base.public),
        pages_dir: over.pages_dir.unwrap_or(base.pages_dir),
        paths,
        serve,
    }
}
