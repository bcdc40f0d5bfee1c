//! Command-line interface implementation
//!
//! Three entry points: `dev` (watch + serve), `build` (full production
//! build) and `clean` (remove generated directories). The process exit
//! code reflects the top-level task's outcome.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{load_config, CONFIG_FILE};
use crate::pipeline::Pipeline;
use crate::serve::{DevServer, ReloadState};
use crate::task::Task;
use crate::watch;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// Pages - compile, bundle and serve static front-end projects
#[derive(Parser)]
#[command(name = "pages")]
#[command(about = "Pages - compile, bundle and serve static front-end projects")]
#[command(version)]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Print per-task progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile sources and serve them with live reload
    Dev {
        /// Port to bind (overrides pages.toml)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the full production build
    Build,
    /// Remove the scratch and output directories
    Clean,
}

/// CLI entry point.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let root = match cli.root.clone().map(Ok).unwrap_or_else(std::env::current_dir) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: cannot determine project root: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let config = load_config(&root);
    if cli.verbose {
        match crate::config::try_load_override(&root.join(CONFIG_FILE)) {
            Ok(Some(_)) => println!("Using config: {}", root.join(CONFIG_FILE).display()),
            Ok(None) => println!("No {} found, using defaults", CONFIG_FILE),
            Err(e) => println!("Ignoring {}: {}", CONFIG_FILE, e),
        }
    }

    let pipeline = Pipeline::new(config, root.clone()).with_verbose(cli.verbose);

    match cli.command {
        Commands::Clean => run_task(pipeline.clean()),
        Commands::Build => run_task(pipeline.build()),
        Commands::Dev { port } => run_dev(pipeline, port),
    }
}

/// Run a task to completion and report the outcome.
fn run_task(task: Task) -> ExitCode {
    let name = task.name().to_string();
    let start = Instant::now();
    match task.run() {
        Ok(()) => {
            println!("{} complete in {:.2?}", name, start.elapsed());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Clean, compile, then serve with the watch loop on this thread.
fn run_dev(pipeline: Pipeline, port: Option<u16>) -> ExitCode {
    if let Err(e) = pipeline.dev_compile().run() {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    let port = port.unwrap_or(pipeline.config().serve.port);
    let root = pipeline.root().to_path_buf();

    let state = Arc::new(ReloadState::new());
    let server = DevServer::new(pipeline.config(), &root, Arc::clone(&state));
    if let Err(e) = server.start(port) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }
    println!("Serving on http://localhost:{}", port);
    println!("Press Ctrl+C to stop");

    match watch::watch_loop(pipeline, state, &root) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
