//! Style compilation via lightningcss.
//!
//! Compiles modern CSS (nesting, media query ranges, new color syntax) down
//! to widely supported plain CSS. The compile stage emits expanded output
//! into the scratch directory; the bundler calls [`minify_css`] instead.

use super::{Transform, TransformError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::Path;

/// Browser floor the compiler downlevels to.
///
/// Old enough that nested rules and modern selectors are rewritten into
/// plain CSS, matching what the expanded scratch output is for.
fn targets() -> Targets {
    Targets::from(Browsers {
        chrome: Some(80 << 16),
        firefox: Some(78 << 16),
        safari: Some(13 << 16),
        ..Browsers::default()
    })
}

fn compile(source: &str, path: &Path, minify: bool) -> Result<String, TransformError> {
    let options = ParserOptions {
        filename: path.display().to_string(),
        ..ParserOptions::default()
    };

    let mut stylesheet = StyleSheet::parse(source, options).map_err(|e| {
        let line = e.loc.as_ref().map(|loc| loc.line + 1);
        match line {
            Some(line) => TransformError::with_line(path, line, e.kind.to_string()),
            None => TransformError::new(path, e.kind.to_string()),
        }
    })?;

    stylesheet
        .minify(MinifyOptions { targets: targets(), ..MinifyOptions::default() })
        .map_err(|e| TransformError::new(path, e.to_string()))?;

    let output = stylesheet
        .to_css(PrinterOptions { minify, targets: targets(), ..PrinterOptions::default() })
        .map_err(|e| TransformError::new(path, e.to_string()))?;

    Ok(output.code)
}

/// Minify a stylesheet for bundling.
pub fn minify_css(source: &str, path: &Path) -> Result<String, TransformError> {
    compile(source, path, true)
}

/// The style capability used by the compile stage.
#[derive(Debug, Default)]
pub struct StyleCompiler;

impl Transform for StyleCompiler {
    fn apply(&self, source: &str, path: &Path) -> Result<String, TransformError> {
        compile(source, path, false)
    }
}
