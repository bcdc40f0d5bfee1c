//! Build pipeline orchestration.
//!
//! Turns a [`BuildConfig`] into concrete [`Task`]s and composes them into
//! the fixed graphs:
//!
//! - `compile` = style, script and markup concurrently
//! - `build`   = clean, then (compile + bundle) alongside the asset copies
//! - `dev`     = clean, then compile (the caller starts the server after)
//!
//! The graph is fixed at definition time; adding an asset category means
//! adding a factory here and wiring it into the graph.

use crate::config::BuildConfig;
use crate::discovery::{file_set, FileSet};
use crate::task::{concurrent, sequence, Task, TaskError};
use crate::transform::{MarkupExpander, ScriptTransform, StyleCompiler, Transform};
use crate::useref;
use rayon::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Factory for the pipeline's tasks.
///
/// Holds the immutable configuration and project root; every task closure
/// gets its own clones of the paths it needs, so there is no shared mutable
/// state between running tasks beyond the filesystem itself.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: BuildConfig,
    root: PathBuf,
    verbose: bool,
}

impl Pipeline {
    /// Create a pipeline for a project root.
    pub fn new(config: BuildConfig, root: PathBuf) -> Self {
        Self { config, root, verbose: false }
    }

    /// Enable per-task progress output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The configuration this pipeline was built from.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The project root this pipeline resolves paths against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the scratch and output directories.
    ///
    /// Absent directories are not an error, which makes clean idempotent.
    pub fn clean(&self) -> Task {
        let paths = vec![self.config.temp_dir(&self.root), self.config.dist_dir(&self.root)];
        Task::new("clean", move || {
            for path in &paths {
                if path.exists() {
                    fs::remove_dir_all(path)
                        .map_err(|e| TaskError::new("clean", format!("{}: {}", path.display(), e)))?;
                }
            }
            Ok(())
        })
    }

    /// Compile stylesheets into the scratch directory.
    pub fn style(&self) -> Task {
        self.transform_task("style", self.config.paths.style.clone(), vec![], None, StyleCompiler)
    }

    /// Downlevel scripts into the scratch directory.
    pub fn script(&self) -> Task {
        self.transform_task(
            "script",
            self.config.paths.script.clone(),
            vec![],
            None,
            ScriptTransform,
        )
    }

    /// Expand markup includes into the scratch directory.
    ///
    /// Files matching the exclusion patterns (layout fragments) are dropped
    /// from the set, and the pages directory prefix is stripped so pages
    /// land at the scratch root.
    pub fn markup(&self) -> Task {
        self.transform_task(
            "markup",
            self.config.paths.pages.clone(),
            self.config.paths.pages_exclude.clone(),
            Some(self.config.pages_dir.clone()),
            MarkupExpander,
        )
    }

    /// Optimize and copy images straight to the output directory.
    pub fn images(&self) -> Task {
        self.copy_task(
            "images",
            self.config.src_dir(&self.root),
            self.config.paths.images.clone(),
            true,
        )
    }

    /// Copy fonts straight to the output directory.
    pub fn fonts(&self) -> Task {
        self.copy_task(
            "fonts",
            self.config.src_dir(&self.root),
            self.config.paths.fonts.clone(),
            false,
        )
    }

    /// Copy the public directory straight to the output directory.
    pub fn extra(&self) -> Task {
        self.copy_task("extra", self.config.public_dir(&self.root), "**".to_string(), false)
    }

    /// Bundle and minify assets referenced from compiled markup.
    pub fn useref(&self) -> Task {
        let temp = self.config.temp_dir(&self.root);
        let dist = self.config.dist_dir(&self.root);
        let root = self.root.clone();
        let verbose = self.verbose;
        Task::new("useref", move || {
            let stats = useref::bundle(&temp, &dist, &root)
                .map_err(|e| TaskError::new("useref", e))?;
            if verbose {
                println!(
                    "useref: {} page(s), {} bundle(s)",
                    stats.pages_written, stats.bundles_written
                );
            }
            Ok(())
        })
    }

    /// The concurrent compile stage.
    pub fn compile(&self) -> Task {
        concurrent("compile", vec![self.style(), self.script(), self.markup()])
    }

    /// The full production build graph.
    pub fn build(&self) -> Task {
        sequence(
            "build",
            vec![
                self.clean(),
                concurrent(
                    "assemble",
                    vec![
                        sequence("compile-bundle", vec![self.compile(), self.useref()]),
                        self.images(),
                        self.fonts(),
                        self.extra(),
                    ],
                ),
            ],
        )
    }

    /// The development pre-serve graph: clean then compile.
    pub fn dev_compile(&self) -> Task {
        sequence("dev", vec![self.clean(), self.compile()])
    }

    /// The transform task by category name, used by the watch loop to
    /// re-run the matching stage on a file change.
    pub fn transform_for(&self, category: &str) -> Option<Task> {
        match category {
            "style" => Some(self.style()),
            "script" => Some(self.script()),
            "markup" => Some(self.markup()),
            _ => None,
        }
    }

    fn transform_task<T: Transform + 'static>(
        &self,
        name: &'static str,
        pattern: String,
        excludes: Vec<String>,
        strip_prefix: Option<PathBuf>,
        transform: T,
    ) -> Task {
        let src_dir = self.config.src_dir(&self.root);
        let out_dir = self.config.temp_dir(&self.root);
        let verbose = self.verbose;
        Task::new(name, move || {
            let set = file_set(&src_dir, &pattern, &excludes)
                .map_err(|e| TaskError::new(name, e))?;
            run_transform(name, &set, &transform, &out_dir, strip_prefix.as_deref())?;
            if verbose {
                println!("{}: {} file(s) -> {}", name, set.len(), out_dir.display());
            }
            Ok(())
        })
    }

    fn copy_task(&self, name: &'static str, base: PathBuf, pattern: String, optimize: bool) -> Task {
        let out_dir = self.config.dist_dir(&self.root);
        let verbose = self.verbose;
        Task::new(name, move || {
            // A missing base directory means an empty category, not an error
            if !base.exists() {
                return Ok(());
            }
            let set = file_set(&base, &pattern, &[]).map_err(|e| TaskError::new(name, e))?;
            copy_assets(name, &set, &out_dir, optimize)?;
            if verbose {
                println!("{}: {} file(s) -> {}", name, set.len(), out_dir.display());
            }
            Ok(())
        })
    }
}

/// Apply a transform to every file in a set, mirroring the relative tree
/// into `out_dir`. The first failing file aborts the task.
fn run_transform(
    name: &str,
    set: &FileSet,
    transform: &dyn Transform,
    out_dir: &Path,
    strip_prefix: Option<&Path>,
) -> Result<(), TaskError> {
    for file in &set.files {
        let source = fs::read_to_string(&file.path)
            .map_err(|e| TaskError::new(name, format!("{}: {}", file.path.display(), e)))?;
        let output =
            transform.apply(&source, &file.path).map_err(|e| TaskError::new(name, e))?;

        let relative = match strip_prefix {
            Some(prefix) => {
                file.relative.strip_prefix(prefix).unwrap_or(&file.relative).to_path_buf()
            }
            None => file.relative.clone(),
        };
        let out_path = out_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TaskError::new(name, format!("{}: {}", parent.display(), e)))?;
        }
        fs::write(&out_path, output)
            .map_err(|e| TaskError::new(name, format!("{}: {}", out_path.display(), e)))?;
    }
    Ok(())
}

/// Copy a file set into `out_dir`, optionally re-encoding images.
///
/// Files are independent, so the copies run in parallel; the first failure
/// in set order is reported after all spawned copies settle.
fn copy_assets(
    name: &str,
    set: &FileSet,
    out_dir: &Path,
    optimize: bool,
) -> Result<(), TaskError> {
    let results: Vec<Result<(), TaskError>> = set
        .files
        .par_iter()
        .map(|file| {
            let out_path = out_dir.join(&file.relative);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| TaskError::new(name, format!("{}: {}", parent.display(), e)))?;
            }

            let bytes = fs::read(&file.path)
                .map_err(|e| TaskError::new(name, format!("{}: {}", file.path.display(), e)))?;
            let bytes = if optimize { optimize_image(&file.path, bytes) } else { bytes };

            fs::write(&out_path, bytes)
                .map_err(|e| TaskError::new(name, format!("{}: {}", out_path.display(), e)))?;
            Ok(())
        })
        .collect();

    for result in results {
        result?;
    }
    Ok(())
}

/// Losslessly re-encode PNG and JPEG files, keeping whichever is smaller.
///
/// Anything that is not one of those formats, or fails to decode, copies
/// through unchanged.
fn optimize_image(path: &Path, original: Vec<u8>) -> Vec<u8> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => image::ImageOutputFormat::Png,
        Some("jpg") | Some("jpeg") => image::ImageOutputFormat::Jpeg(85),
        _ => return original,
    };

    let decoded = match image::load_from_memory(&original) {
        Ok(img) => img,
        Err(_) => return original,
    };

    let mut encoded = Vec::new();
    if decoded.write_to(&mut Cursor::new(&mut encoded), format).is_err() {
        return original;
    }

    if encoded.len() < original.len() {
        encoded
    } else {
        original
    }
}
