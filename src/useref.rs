//! Asset bundling driven by reference markers in markup.
//!
//! Compiled pages delimit groups of asset references with marker comments:
//!
//! ```html
//! <!-- build:css assets/styles/site.css -->
//! <link rel="stylesheet" href="assets/styles/reset.css">
//! <link rel="stylesheet" href="assets/styles/main.css">
//! <!-- endbuild -->
//! ```
//!
//! Each group is concatenated in reference order, minified by the output
//! extension, written to the output directory, and the whole block is
//! replaced by a single tag pointing at the bundle. The rewritten page is
//! then whitespace-minified and written alongside the bundles.
//!
//! Bundling is a pure function of the scratch tree: the same input yields
//! byte-identical output.

use crate::discovery::{file_set, DiscoveryError};
use crate::transform::{script, style};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Error during bundling.
#[derive(Debug)]
pub enum BundleError {
    /// Failed to enumerate markup files
    Discovery(DiscoveryError),
    /// IO error
    Io(PathBuf, std::io::Error),
    /// A referenced asset resolved to no file on the search path
    MissingAsset { page: PathBuf, reference: String },
    /// A marker block without a recognized kind or output path
    MalformedMarker { page: PathBuf, marker: String },
    /// Minification of a bundle failed
    Minify(String),
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleError::Discovery(e) => write!(f, "Discovery error: {}", e),
            BundleError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            BundleError::MissingAsset { page, reference } => {
                write!(f, "{}: referenced asset '{}' not found", page.display(), reference)
            }
            BundleError::MalformedMarker { page, marker } => {
                write!(f, "{}: malformed build marker '{}'", page.display(), marker)
            }
            BundleError::Minify(msg) => write!(f, "Minification failed: {}", msg),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<DiscoveryError> for BundleError {
    fn from(e: DiscoveryError) -> Self {
        BundleError::Discovery(e)
    }
}

/// What one bundling run produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BundleStats {
    /// Markup files rewritten into the output directory
    pub pages_written: usize,
    /// Concatenated asset files written
    pub bundles_written: usize,
}

/// Matches a whole marker block: kind, output path and inner references.
fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--\s*build:(\w+)\s+(\S+)\s*-->(.*?)<!--\s*endbuild\s*-->")
            .expect("block regex is valid")
    })
}

/// Matches `href="..."` / `src='...'` inside a marker block.
fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:href|src)\s*=\s*["']([^"']+)["']"#).expect("reference regex is valid")
    })
}

/// Bundle every markup file under `temp_dir` into `dist_dir`.
///
/// `root` is the second entry of the asset search path, after `temp_dir`,
/// so references to vendored files outside the scratch tree still resolve.
pub fn bundle(temp_dir: &Path, dist_dir: &Path, root: &Path) -> Result<BundleStats, BundleError> {
    let pages = file_set(temp_dir, "**/*.html", &[])?;
    let mut stats = BundleStats::default();
    // Collected first, written once; pages are processed in sorted order so
    // a bundle path shared across pages deterministically keeps the first
    // group's content.
    let mut bundles: BTreeMap<PathBuf, String> = BTreeMap::new();

    for page in &pages.files {
        let source = fs::read_to_string(&page.path)
            .map_err(|e| BundleError::Io(page.path.clone(), e))?;

        let rewritten = rewrite_page(&source, &page.relative, temp_dir, root, &mut bundles)?;
        let minified = minify_html(&rewritten);

        let out_path = dist_dir.join(&page.relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BundleError::Io(parent.to_path_buf(), e))?;
        }
        fs::write(&out_path, minified).map_err(|e| BundleError::Io(out_path.clone(), e))?;
        stats.pages_written += 1;
    }

    for (relative, content) in &bundles {
        let out_path = dist_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BundleError::Io(parent.to_path_buf(), e))?;
        }
        fs::write(&out_path, content).map_err(|e| BundleError::Io(out_path.clone(), e))?;
        stats.bundles_written += 1;
    }

    Ok(stats)
}

/// Replace each marker block in a page with a single tag, accumulating the
/// concatenated bundle contents.
fn rewrite_page(
    source: &str,
    page: &Path,
    temp_dir: &Path,
    root: &Path,
    bundles: &mut BTreeMap<PathBuf, String>,
) -> Result<String, BundleError> {
    let mut out = String::with_capacity(source.len());
    let mut last_end = 0;

    for caps in block_re().captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always present");
        let kind = &caps[1];
        let out_ref = &caps[2];
        let body = &caps[3];

        let tag = match kind {
            "css" => format!("<link rel=\"stylesheet\" href=\"{}\">", out_ref),
            "js" => format!("<script src=\"{}\"></script>", out_ref),
            _ => {
                return Err(BundleError::MalformedMarker {
                    page: page.to_path_buf(),
                    marker: format!("build:{} {}", kind, out_ref),
                })
            }
        };

        let bundle_rel = PathBuf::from(out_ref.trim_start_matches('/'));
        let content = concat_group(body, kind, page, &bundle_rel, temp_dir, root)?;
        bundles.entry(bundle_rel).or_insert(content);

        out.push_str(&source[last_end..whole.start()]);
        out.push_str(&tag);
        last_end = whole.end();
    }
    out.push_str(&source[last_end..]);

    Ok(out)
}

/// Concatenate and minify one reference group.
fn concat_group(
    body: &str,
    kind: &str,
    page: &Path,
    bundle_rel: &Path,
    temp_dir: &Path,
    root: &Path,
) -> Result<String, BundleError> {
    let mut concatenated = String::new();

    for caps in reference_re().captures_iter(body) {
        let reference = &caps[1];
        let resolved = resolve_reference(reference, temp_dir, root).ok_or_else(|| {
            BundleError::MissingAsset { page: page.to_path_buf(), reference: reference.to_string() }
        })?;

        let content =
            fs::read_to_string(&resolved).map_err(|e| BundleError::Io(resolved.clone(), e))?;
        concatenated.push_str(&content);
        if !concatenated.ends_with('\n') {
            concatenated.push('\n');
        }
    }

    match kind {
        "css" => style::minify_css(&concatenated, bundle_rel)
            .map_err(|e| BundleError::Minify(e.to_string())),
        _ => script::minify_js(&concatenated, bundle_rel)
            .map_err(|e| BundleError::Minify(e.to_string())),
    }
}

/// Resolve an asset reference against the search path, first hit wins.
fn resolve_reference(reference: &str, temp_dir: &Path, root: &Path) -> Option<PathBuf> {
    let relative = reference.trim_start_matches('/');
    for base in [temp_dir, root] {
        let candidate = base.join(relative);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Collapse insignificant whitespace in markup.
///
/// Runs containing a newline that sit between tags (indentation) are
/// removed outright; any other whitespace run collapses to a single space,
/// so visible spacing between inline elements survives.
pub fn minify_html(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !c.is_whitespace() {
            out.push(c);
            continue;
        }

        let mut had_newline = c == '\n';
        let mut end = i + c.len_utf8();
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            had_newline = had_newline || w == '\n';
            end = j + w.len_utf8();
            chars.next();
        }

        let between_tags =
            out.ends_with('>') && source[end..].starts_with('<');
        if had_newline && between_tags {
            // Indentation between tags carries no meaning
        } else if had_newline {
            out.push('\n');
        } else {
            out.push(' ');
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        path
    }

    const PAGE: &str = r#"<html><head>
<!-- build:css assets/styles/site.css -->
<link rel="stylesheet" href="assets/a.css">
<link rel="stylesheet" href="assets/b.css">
<!-- endbuild -->
</head><body>ok</body></html>"#;

    #[test]
    fn test_bundle_concatenates_and_rewrites() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        let dist = temp.path().join("dist");
        create_test_file(&scratch, "index.html", PAGE);
        create_test_file(&scratch, "assets/a.css", ".a { color: red; }");
        create_test_file(&scratch, "assets/b.css", ".b { color: blue; }");

        let stats = bundle(&scratch, &dist, temp.path()).unwrap();
        assert_eq!(stats, BundleStats { pages_written: 1, bundles_written: 1 });

        let css = fs::read_to_string(dist.join("assets/styles/site.css")).unwrap();
        assert!(css.contains(".a"));
        assert!(css.contains(".b"));
        // Minified: no newline between the two rules
        assert!(!css.trim().contains('\n'));

        let html = fs::read_to_string(dist.join("index.html")).unwrap();
        assert!(html.contains(r#"<link rel="stylesheet" href="assets/styles/site.css">"#));
        assert!(!html.contains("a.css"));
        assert!(!html.contains("build:css"));
    }

    #[test]
    fn test_bundle_js_group() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        let dist = temp.path().join("dist");
        create_test_file(
            &scratch,
            "index.html",
            "<!-- build:js assets/app.js -->\n<script src=\"assets/one.js\"></script>\n<!-- endbuild -->",
        );
        create_test_file(&scratch, "assets/one.js", "var a = 1; // comment\n");

        bundle(&scratch, &dist, temp.path()).unwrap();

        let js = fs::read_to_string(dist.join("assets/app.js")).unwrap();
        assert!(js.contains("var a = 1;"));
        assert!(!js.contains("comment"));

        let html = fs::read_to_string(dist.join("index.html")).unwrap();
        assert!(html.contains(r#"<script src="assets/app.js"></script>"#));
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        create_test_file(&scratch, "index.html", PAGE);
        create_test_file(&scratch, "assets/a.css", ".a {}");
        // b.css deliberately absent

        let err = bundle(&scratch, &temp.path().join("dist"), temp.path()).unwrap_err();
        assert!(matches!(err, BundleError::MissingAsset { .. }));
    }

    #[test]
    fn test_unknown_marker_kind_is_fatal() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        create_test_file(
            &scratch,
            "index.html",
            "<!-- build:wasm assets/app.wasm -->\n<!-- endbuild -->",
        );

        let err = bundle(&scratch, &temp.path().join("dist"), temp.path()).unwrap_err();
        assert!(matches!(err, BundleError::MalformedMarker { .. }));
    }

    #[test]
    fn test_search_path_falls_back_to_root() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        create_test_file(
            &scratch,
            "index.html",
            "<!-- build:js assets/vendor.js -->\n<script src=\"/node_modules/lib/lib.js\"></script>\n<!-- endbuild -->",
        );
        // Vendored file lives outside the scratch tree
        create_test_file(temp.path(), "node_modules/lib/lib.js", "var lib = {};");

        bundle(&scratch, &temp.path().join("dist"), temp.path()).unwrap();
        let js = fs::read_to_string(temp.path().join("dist/assets/vendor.js")).unwrap();
        assert!(js.contains("var lib"));
    }

    #[test]
    fn test_bundle_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        create_test_file(&scratch, "index.html", PAGE);
        create_test_file(&scratch, "assets/a.css", ".a { color: red; }");
        create_test_file(&scratch, "assets/b.css", ".b { color: blue; }");

        let dist1 = temp.path().join("dist1");
        let dist2 = temp.path().join("dist2");
        bundle(&scratch, &dist1, temp.path()).unwrap();
        bundle(&scratch, &dist2, temp.path()).unwrap();

        assert_eq!(
            fs::read(dist1.join("index.html")).unwrap(),
            fs::read(dist2.join("index.html")).unwrap()
        );
        assert_eq!(
            fs::read(dist1.join("assets/styles/site.css")).unwrap(),
            fs::read(dist2.join("assets/styles/site.css")).unwrap()
        );
    }

    #[test]
    fn test_page_without_markers_copies_minified() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        create_test_file(&scratch, "about.html", "<html>\n  <body>\n    hi\n  </body>\n</html>");

        let stats = bundle(&scratch, &temp.path().join("dist"), temp.path()).unwrap();
        assert_eq!(stats.bundles_written, 0);

        let html = fs::read_to_string(temp.path().join("dist/about.html")).unwrap();
        assert_eq!(html, "<html><body>\nhi\n</body></html>");
    }

    #[test]
    fn test_minify_html_keeps_inline_spacing() {
        let out = minify_html("<b>a</b> <b>c</b>");
        assert_eq!(out, "<b>a</b> <b>c</b>");
    }

    #[test]
    fn test_minify_html_drops_indentation() {
        let out = minify_html("<ul>\n  <li>x</li>\n  <li>y</li>\n</ul>");
        assert_eq!(out, "<ul><li>x</li><li>y</li></ul>");
    }

    #[test]
    fn test_empty_scratch_tree_is_ok() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join(".temp");
        fs::create_dir_all(&scratch).unwrap();

        let stats = bundle(&scratch, &temp.path().join("dist"), temp.path()).unwrap();
        assert_eq!(stats, BundleStats::default());
    }
}
