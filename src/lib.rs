//! Pages - Library for building static front-end projects
//!
//! This library provides functionality to:
//! - Compile styles, downlevel scripts and expand HTML includes into a
//!   scratch directory
//! - Bundle and minify referenced assets into a distributable tree
//! - Serve a project locally with file watching and live reload

pub mod cli;
pub mod config;
pub mod discovery;
pub mod pipeline;
pub mod serve;
pub mod task;
pub mod transform;
pub mod useref;
pub mod watch;
