//! A reference driver for nodeflow graphs.
//!
//! [`Runner`] serves every request an invocation makes from an in-memory
//! [`store::StreamStore`], one invocation at a time.

mod runner;

pub mod config;
pub mod errors;
pub mod store;

pub use config::RunnerConfig;
pub use errors::RunError;
pub use runner::Runner;
