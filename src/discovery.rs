//! Source file discovery.
//!
//! Matches glob patterns against a base directory and produces ordered file
//! sets that preserve the relative tree structure, so transform and copy
//! tasks can mirror it into their output directory. File sets are recomputed
//! on every run; nothing is cached between invocations.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};

/// Error during file discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
    /// IO error during enumeration
    Io(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidPattern(pattern, err) => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, err)
            }
            DiscoveryError::Io(err) => write!(f, "IO error during discovery: {}", err),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

/// One matched source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the matched base directory
    pub relative: PathBuf,
}

/// The ordered set of files matched by a glob at one point in time.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    /// Matched files, sorted by relative path
    pub files: Vec<SourceFile>,
}

impl FileSet {
    /// Whether the set matched nothing.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of matched files.
    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Glob match options used throughout: separators must be matched literally
/// so `*.css` stays within one directory level and `**` crosses levels.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

/// Enumerate files matching a glob pattern under a base directory.
///
/// Directories are skipped; unreadable entries are reported and skipped.
/// Results are sorted for deterministic task behavior.
///
/// A pattern ending in a `**` component means "everything underneath", but
/// the glob crate expands a bare trailing `**` to the directories alone, so
/// it is widened to `**/*` before matching.
pub fn match_glob(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let normalized = if pattern == "**" || pattern.ends_with("/**") {
        format!("{}/*", pattern)
    } else {
        pattern.to_string()
    };
    let full_pattern = base.join(&normalized);
    let pattern_str = full_pattern.to_string_lossy();

    let paths = glob::glob_with(&pattern_str, match_options())
        .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => {
                // Log but continue on unreadable entries
                eprintln!("Warning: error reading path: {}", e);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Build a [`FileSet`] for a pattern with exclusions applied.
///
/// A file matching any exclude pattern is removed from the result even
/// though the inclusion pattern matched it. Exclusions are matched against
/// the path relative to `base`.
pub fn file_set(
    base: &Path,
    pattern: &str,
    excludes: &[String],
) -> Result<FileSet, DiscoveryError> {
    let exclude_patterns: Vec<Pattern> = excludes
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| DiscoveryError::InvalidPattern(p.clone(), e)))
        .collect::<Result<_, _>>()?;

    let options = match_options();
    let mut files = Vec::new();
    for path in match_glob(base, pattern)? {
        let relative = match path.strip_prefix(base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        if exclude_patterns.iter().any(|p| p.matches_path_with(&relative, options)) {
            continue;
        }
        files.push(SourceFile { path, relative });
    }

    Ok(FileSet { files })
}
