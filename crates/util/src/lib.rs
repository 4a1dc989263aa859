//! Shared utilities used throughout the workspace

mod env;
pub use env::*;

pub mod logging;
pub mod names;
