//! Markup include expansion.
//!
//! Pages may pull in shared fragments with an include directive:
//!
//! ```html
//! @@include("layout/header.html")
//! ```
//!
//! The referenced path is resolved relative to the file containing the
//! directive, and expansion recurses into included fragments with a depth
//! limit guarding against include cycles.

use super::{Transform, TransformError};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Maximum include nesting before expansion is treated as a cycle.
const MAX_DEPTH: usize = 16;

/// Matches `@@include("path")` and `@@include('path')`.
fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"@@include\(\s*['"]([^'"]+)['"]\s*\)"#).expect("include regex is valid")
    })
}

fn expand(source: &str, path: &Path, depth: usize) -> Result<String, TransformError> {
    if depth > MAX_DEPTH {
        return Err(TransformError::new(
            path,
            format!("include depth exceeds {} (include cycle?)", MAX_DEPTH),
        ));
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out = String::with_capacity(source.len());
    let mut last_end = 0;

    for caps in include_re().captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always present");
        let reference = &caps[1];
        let included_path = base.join(reference);

        let fragment = fs::read_to_string(&included_path).map_err(|e| {
            let line = source[..whole.start()].matches('\n').count() as u32 + 1;
            TransformError::with_line(path, line, format!("cannot include '{}': {}", reference, e))
        })?;

        let expanded = expand(&fragment, &included_path, depth + 1)?;

        out.push_str(&source[last_end..whole.start()]);
        out.push_str(&expanded);
        last_end = whole.end();
    }
    out.push_str(&source[last_end..]);

    Ok(out)
}

/// The markup capability used by the compile stage.
#[derive(Debug, Default)]
pub struct MarkupExpander;

impl Transform for MarkupExpander {
    fn apply(&self, source: &str, path: &Path) -> Result<String, TransformError> {
        expand(source, path, 0)
    }
}
