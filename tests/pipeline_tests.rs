//! Integration tests for the pages build pipeline.
//!
//! Exercises the full task graphs end to end on temporary project trees:
//! clean, the concurrent compile stage, bundling, asset copies and the
//! override configuration file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use pages::config::{load_config, BuildConfig};
use pages::pipeline::Pipeline;

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a test file with content, creating parent directories.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// Pipeline over a fresh temporary project with default configuration.
fn create_test_pipeline() -> (TempDir, Pipeline) {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    let pipeline = Pipeline::new(BuildConfig::default(), temp.path().to_path_buf());
    (temp, pipeline)
}

/// Recursively collect file paths under a directory, relative to it.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

// ============================================================================
// Clean
// ============================================================================

#[test]
fn clean_is_idempotent() {
    let (temp, pipeline) = create_test_pipeline();
    fs::create_dir_all(temp.path().join(".temp/a/b")).unwrap();
    fs::create_dir_all(temp.path().join("dist/c")).unwrap();

    pipeline.clean().run().unwrap();
    assert!(!temp.path().join(".temp").exists());
    assert!(!temp.path().join("dist").exists());

    // Second run over nothing is a no-op, not an error
    pipeline.clean().run().unwrap();
}

// ============================================================================
// Compile
// ============================================================================

#[test]
fn compile_mirrors_source_tree() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/css/main.css", "body { color: red; }");
    create_test_file(temp.path(), "src/assets/css/nested/extra.css", "p { margin: 0; }");
    create_test_file(temp.path(), "src/assets/js/app.js", "let n = 1;");
    create_test_file(temp.path(), "src/pages/index.html", "<h1>home</h1>");
    create_test_file(temp.path(), "src/pages/about/index.html", "<h1>about</h1>");

    pipeline.compile().run().unwrap();

    let files = collect_files(&temp.path().join(".temp"));
    assert_eq!(
        files,
        vec![
            PathBuf::from("about/index.html"),
            PathBuf::from("assets/css/main.css"),
            PathBuf::from("assets/css/nested/extra.css"),
            PathBuf::from("assets/js/app.js"),
            PathBuf::from("index.html"),
        ]
    );
}

#[test]
fn compile_excludes_layout_fragments() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/pages/index.html", "<p>x</p>");
    create_test_file(temp.path(), "src/pages/layout/base.html", "<p>layout</p>");

    pipeline.compile().run().unwrap();

    let files = collect_files(&temp.path().join(".temp"));
    assert_eq!(files, vec![PathBuf::from("index.html")]);
}

#[test]
fn compile_failure_propagates_from_any_branch() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/app.js", "let s = 'unterminated");

    let err = pipeline.compile().run().unwrap_err();
    assert_eq!(err.task, "script");
    assert!(err.message.contains("unterminated"));
}

// ============================================================================
// Full build
// ============================================================================

const INDEX_WITH_MARKER: &str = r#"<html><head>
<!-- build:css assets/styles/site.css -->
<link rel="stylesheet" href="assets/main.css">
<!-- endbuild -->
</head><body><p>hello</p></body></html>"#;

#[test]
fn build_bundles_style_reference() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/main.css", ".title { color: red; }");
    create_test_file(temp.path(), "src/pages/index.html", INDEX_WITH_MARKER);

    pipeline.build().run().unwrap();

    // One minified CSS bundle at the path named by the marker
    let css = fs::read_to_string(temp.path().join("dist/assets/styles/site.css")).unwrap();
    assert!(css.contains(".title"));
    assert!(!css.contains('\n'));

    // The page references the bundle, not the source stylesheet
    let html = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
    assert!(html.contains(r#"href="assets/styles/site.css""#));
    assert!(!html.contains("main.css"));
}

#[test]
fn build_output_references_resolve() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/main.css", ".a { color: red; }");
    create_test_file(temp.path(), "src/assets/app.js", "var x = 1;");
    create_test_file(
        temp.path(),
        "src/pages/index.html",
        r#"<html><head>
<!-- build:css assets/styles/site.css -->
<link rel="stylesheet" href="assets/main.css">
<!-- endbuild -->
<!-- build:js assets/scripts/site.js -->
<script src="assets/app.js"></script>
<!-- endbuild -->
</head><body></body></html>"#,
    );

    pipeline.build().run().unwrap();

    // Every href/src in the bundled page resolves in the output tree
    let html = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
    let re = regex_lite(&html);
    assert!(!re.is_empty());
    for reference in re {
        assert!(
            temp.path().join("dist").join(&reference).is_file(),
            "dangling reference: {}",
            reference
        );
    }
}

/// Pull href/src attribute values out of markup.
fn regex_lite(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    for marker in ["href=\"", "src=\""] {
        let mut rest = html;
        while let Some(idx) = rest.find(marker) {
            rest = &rest[idx + marker.len()..];
            if let Some(end) = rest.find('"') {
                out.push(rest[..end].to_string());
            }
        }
    }
    out
}

#[test]
fn build_missing_reference_fails() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/pages/index.html", INDEX_WITH_MARKER);
    // assets/main.css deliberately absent

    let err = pipeline.build().run().unwrap_err();
    assert_eq!(err.task, "useref");
    assert!(err.message.contains("main.css"));
}

#[test]
fn build_empty_source_tree_passes_through_public_only() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "public/robots.txt", "User-agent: *");

    pipeline.build().run().unwrap();

    let files = collect_files(&temp.path().join("dist"));
    assert_eq!(files, vec![PathBuf::from("robots.txt")]);
}

#[test]
fn build_twice_is_deterministic() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/main.css", ".a { color: red; }");
    create_test_file(temp.path(), "src/pages/index.html", INDEX_WITH_MARKER);
    create_test_file(temp.path(), "public/favicon.ico", "icon");

    pipeline.build().run().unwrap();
    let first_html = fs::read(temp.path().join("dist/index.html")).unwrap();
    let first_css = fs::read(temp.path().join("dist/assets/styles/site.css")).unwrap();

    pipeline.build().run().unwrap();
    assert_eq!(fs::read(temp.path().join("dist/index.html")).unwrap(), first_html);
    assert_eq!(
        fs::read(temp.path().join("dist/assets/styles/site.css")).unwrap(),
        first_css
    );
}

#[test]
fn build_copies_images_fonts_and_public() {
    let (temp, pipeline) = create_test_pipeline();
    create_test_file(temp.path(), "src/assets/images/logo.png", "not really a png");
    create_test_file(temp.path(), "src/assets/fonts/site.woff2", "font");
    create_test_file(temp.path(), "public/humans.txt", "us");

    pipeline.build().run().unwrap();

    assert!(temp.path().join("dist/assets/images/logo.png").exists());
    assert!(temp.path().join("dist/assets/fonts/site.woff2").exists());
    assert!(temp.path().join("dist/humans.txt").exists());
}

// ============================================================================
// Override configuration
// ============================================================================

#[test]
fn malformed_override_never_breaks_the_build() {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "pages.toml", "not toml at {{{ all");
    create_test_file(temp.path(), "src/pages/index.html", "<p>x</p>");
    create_test_file(temp.path(), "public/ok.txt", "ok");

    // Defaults apply and every entry point still completes
    let config = load_config(temp.path());
    assert_eq!(config, BuildConfig::default());

    let pipeline = Pipeline::new(config, temp.path().to_path_buf());
    pipeline.build().run().unwrap();
    pipeline.clean().run().unwrap();
}

#[test]
fn override_paths_take_precedence() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "pages.toml",
        r#"
[build]
dist = "out"

[build.paths]
style = "styles/**/*.css"
"#,
    );
    create_test_file(temp.path(), "src/styles/site.css", "em { color: teal; }");
    create_test_file(temp.path(), "src/pages/index.html", "<p>x</p>");

    let config = load_config(temp.path());
    let pipeline = Pipeline::new(config, temp.path().to_path_buf());
    pipeline.build().run().unwrap();

    assert!(temp.path().join(".temp/styles/site.css").exists());
    assert!(temp.path().join("out/index.html").exists());
    assert!(!temp.path().join("dist").exists());
}
