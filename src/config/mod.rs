//! Project configuration for `pages.toml`

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
