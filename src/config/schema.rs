//! Configuration schema types for `pages.toml`
//!
//! Defines the directory layout, per-category glob patterns and dev server
//! settings for a pages project.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Resolved build configuration.
///
/// Created once at startup by merging defaults with an optional `pages.toml`
/// override and treated as immutable for the process lifetime. Every task
/// factory receives a clone of this value; there is no ambient global config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Source root, relative to the project root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Final output root
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
    /// Scratch output of transform tasks, consumed by bundling and the dev
    /// server, never the final artifact
    #[serde(default = "default_temp")]
    pub temp: PathBuf,
    /// Static files copied through untouched
    #[serde(default = "default_public")]
    pub public: PathBuf,
    /// Sub-directory of `src` holding markup inputs; stripped from output
    /// paths so `pages/a.html` lands at the scratch root
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,
    /// Glob patterns per asset category
    #[serde(default)]
    pub paths: PathsConfig,
    /// Dev server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Glob patterns for each asset category, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Stylesheet sources
    #[serde(default = "default_style")]
    pub style: String,
    /// Script sources
    #[serde(default = "default_script")]
    pub script: String,
    /// Markup sources
    #[serde(default = "default_pages")]
    pub pages: String,
    /// Markup files matched by `pages` that must not be compiled on their
    /// own (layout fragments pulled in via includes)
    #[serde(default = "default_pages_exclude")]
    pub pages_exclude: Vec<String>,
    /// Image assets
    #[serde(default = "default_images")]
    pub images: String,
    /// Font assets
    #[serde(default = "default_fonts")]
    pub fonts: String,
}

/// Dev server and watch loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Port to bind the HTTP server to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Debounce window for file change events, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// URL prefix mapped onto the dependency assets directory
    #[serde(default = "default_vendor_route")]
    pub vendor_route: String,
    /// Dependency assets directory, relative to the project root
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

fn default_temp() -> PathBuf {
    PathBuf::from(".temp")
}

fn default_public() -> PathBuf {
    PathBuf::from("public")
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_style() -> String {
    "assets/**/*.css".to_string()
}

fn default_script() -> String {
    "assets/**/*.js".to_string()
}

fn default_pages() -> String {
    "pages/**/*.html".to_string()
}

fn default_pages_exclude() -> Vec<String> {
    vec!["pages/layout/**".to_string()]
}

fn default_images() -> String {
    "assets/**/images/**".to_string()
}

fn default_fonts() -> String {
    "assets/fonts/**".to_string()
}

fn default_port() -> u16 {
    2080
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_vendor_route() -> String {
    "/node_modules".to_string()
}

fn default_vendor_dir() -> PathBuf {
    PathBuf::from("node_modules")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            dist: default_dist(),
            temp: default_temp(),
            public: default_public(),
            pages_dir: default_pages_dir(),
            paths: PathsConfig::default(),
            serve: ServeConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            style: default_style(),
            script: default_script(),
            pages: default_pages(),
            pages_exclude: default_pages_exclude(),
            images: default_images(),
            fonts: default_fonts(),
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            debounce_ms: default_debounce_ms(),
            vendor_route: default_vendor_route(),
            vendor_dir: default_vendor_dir(),
        }
    }
}

impl BuildConfig {
    /// Absolute source directory.
    pub fn src_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.src)
    }

    /// Absolute scratch directory.
    pub fn temp_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.temp)
    }

    /// Absolute output directory.
    pub fn dist_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.dist)
    }

    /// Absolute public directory.
    pub fn public_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.public)
    }

    /// Validate the configuration, returning a list of problems.
    ///
    /// An override file that fails validation is treated the same as one
    /// that fails to parse: ignored in favor of the defaults.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("src", &self.src),
            ("dist", &self.dist),
            ("temp", &self.temp),
            ("public", &self.public),
        ] {
            if value.as_os_str().is_empty() {
                errors.push(format!("build.{} must not be empty", field));
            }
        }
        if self.serve.port == 0 {
            errors.push("build.serve.port must not be 0".to_string());
        }
        if !self.serve.vendor_route.starts_with('/') {
            errors.push("build.serve.vendor_route must start with '/'".to_string());
        }
        if self.paths.pages.is_empty() {
            errors.push("build.paths.pages must not be empty".to_string());
        }

        errors
    }
}

/// Resolve a path relative to the project root.
///
/// Absolute paths are returned unchanged.
fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = BuildConfig::default();
        assert_eq!(config.src, PathBuf::from("src"));
        assert_eq!(config.dist, PathBuf::from("dist"));
        assert_eq!(config.temp, PathBuf::from(".temp"));
        assert_eq!(config.public, PathBuf::from("public"));
        assert_eq!(config.pages_dir, PathBuf::from("pages"));
    }

    #[test]
    fn test_default_patterns() {
        let paths = PathsConfig::default();
        assert_eq!(paths.style, "assets/**/*.css");
        assert_eq!(paths.script, "assets/**/*.js");
        assert_eq!(paths.pages, "pages/**/*.html");
        assert_eq!(paths.pages_exclude, vec!["pages/layout/**".to_string()]);
    }

    #[test]
    fn test_default_serve() {
        let serve = ServeConfig::default();
        assert_eq!(serve.port, 2080);
        assert_eq!(serve.debounce_ms, 100);
        assert_eq!(serve.vendor_route, "/node_modules");
    }

    #[test]
    fn test_dir_resolution_relative() {
        let config = BuildConfig::default();
        let root = Path::new("/project");
        assert_eq!(config.src_dir(root), PathBuf::from("/project/src"));
        assert_eq!(config.temp_dir(root), PathBuf::from("/project/.temp"));
        assert_eq!(config.dist_dir(root), PathBuf::from("/project/dist"));
        assert_eq!(config.public_dir(root), PathBuf::from("/project/public"));
    }

    #[test]
    fn test_dir_resolution_absolute() {
        let config = BuildConfig { dist: PathBuf::from("/out"), ..Default::default() };
        assert_eq!(config.dist_dir(Path::new("/project")), PathBuf::from("/out"));
    }

    #[test]
    fn test_validate_default_is_clean() {
        assert!(BuildConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_dirs_and_port() {
        let mut config = BuildConfig::default();
        config.dist = PathBuf::new();
        config.serve.port = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_vendor_route() {
        let mut config = BuildConfig::default();
        config.serve.vendor_route = "node_modules".to_string();
        assert_eq!(config.validate().len(), 1);
    }
}
