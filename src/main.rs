//! Pages - Command-line build tool for static front-end projects

use std::process::ExitCode;

use pages::cli;

fn main() -> ExitCode {
    cli::run()
}
