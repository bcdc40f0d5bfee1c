//! Watch loop for the dev server.
//!
//! Watches the source and public directories, re-runs the matching
//! transform task when a source file changes, and bumps the reload
//! generation so connected browsers refresh. Asset categories without a
//! transform step (images, fonts, public files) trigger a reload alone.
//!
//! A failing task is reported and the loop keeps running; the developer
//! retries by saving again.

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BuildConfig;
use crate::pipeline::Pipeline;
use crate::serve::{ReloadState, ServeError};
use glob::{MatchOptions, Pattern};

/// Asset category a changed file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    /// Stylesheet sources, recompiled on change
    Style,
    /// Script sources, recompiled on change
    Script,
    /// Markup sources, recompiled on change
    Markup,
    /// Images, fonts and public files, reload only
    Static,
}

impl Category {
    /// The transform task name for this category, if it has one.
    pub fn task_name(self) -> Option<&'static str> {
        match self {
            Category::Style => Some("style"),
            Category::Script => Some("script"),
            Category::Markup => Some("markup"),
            Category::Static => None,
        }
    }
}

/// Compiled glob patterns for classifying changed files.
pub struct Classifier {
    style: Pattern,
    script: Pattern,
    pages: Pattern,
    images: Pattern,
    fonts: Pattern,
    options: MatchOptions,
}

impl Classifier {
    /// Compile the configured category patterns.
    ///
    /// Patterns come from the validated configuration; a pattern that does
    /// not compile classifies nothing rather than failing the loop.
    pub fn new(config: &BuildConfig) -> Self {
        let compile = |p: &str| Pattern::new(p).unwrap_or_default();
        Self {
            style: compile(&config.paths.style),
            script: compile(&config.paths.script),
            pages: compile(&config.paths.pages),
            images: compile(&config.paths.images),
            fonts: compile(&config.paths.fonts),
            options: MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: true,
            },
        }
    }

    /// Classify a path relative to the source directory.
    pub fn classify_source(&self, relative: &Path) -> Option<Category> {
        if self.style.matches_path_with(relative, self.options) {
            Some(Category::Style)
        } else if self.script.matches_path_with(relative, self.options) {
            Some(Category::Script)
        } else if self.pages.matches_path_with(relative, self.options) {
            Some(Category::Markup)
        } else if self.images.matches_path_with(relative, self.options)
            || self.fonts.matches_path_with(relative, self.options)
        {
            Some(Category::Static)
        } else {
            None
        }
    }
}

/// Get current timestamp for logging. UTC, marked with a `Z` suffix since
/// the local offset is not available from std.
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}Z", hours, minutes, seconds)
}

/// Watch the project and rebuild on change.
///
/// Blocks the calling thread and runs until the process is terminated;
/// returns an error only if the watcher cannot be set up or its channel
/// closes.
pub fn watch_loop(
    pipeline: Pipeline,
    state: Arc<ReloadState>,
    root: &Path,
) -> Result<(), ServeError> {
    let config = pipeline.config().clone();
    let src_dir = config.src_dir(root);
    let public_dir = config.public_dir(root);
    let classifier = Classifier::new(&config);

    let (tx, rx) = channel();
    let debounce = Duration::from_millis(config.serve.debounce_ms);
    let mut debouncer = new_debouncer(debounce, tx).map_err(ServeError::WatcherInit)?;

    debouncer
        .watcher()
        .watch(&src_dir, RecursiveMode::Recursive)
        .map_err(ServeError::WatchPath)?;
    if public_dir.exists() {
        debouncer
            .watcher()
            .watch(&public_dir, RecursiveMode::Recursive)
            .map_err(ServeError::WatchPath)?;
    }

    println!("[{}] Watching {} for changes...", timestamp(), src_dir.display());

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let mut categories = BTreeSet::new();
                for event in &events {
                    if let Ok(relative) = event.path.strip_prefix(&src_dir) {
                        if let Some(category) = classifier.classify_source(relative) {
                            categories.insert(category);
                        }
                    } else if event.path.strip_prefix(&public_dir).is_ok() {
                        categories.insert(Category::Static);
                    }
                }

                if categories.is_empty() {
                    continue;
                }

                for event in &events {
                    if let Some(name) = event.path.file_name() {
                        println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                    }
                }

                for category in &categories {
                    let Some(task_name) = category.task_name() else { continue };
                    let Some(task) = pipeline.transform_for(task_name) else { continue };
                    match task.run() {
                        Ok(()) => {
                            println!("[{}] Rebuilt: {}", timestamp(), task_name);
                        }
                        Err(e) => {
                            // Task failures never stop the watch loop
                            eprintln!("[{}] Error: {}", timestamp(), e);
                        }
                    }
                }

                state.notify();
            }
            Ok(Err(error)) => {
                // Watch error (non-fatal) - log but continue watching
                eprintln!("[{}] Watch error: {:?}", timestamp(), error);
            }
            Err(e) => {
                return Err(ServeError::Channel(e.to_string()));
            }
        }
    }
}
