//! Log filters for everything in this workspace

use serde::Deserialize;
use std::fmt::Display;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
	Trace,
	Debug,
	Info,
	Warn,
	Error,
}

impl Default for LogLevel {
	fn default() -> Self {
		Self::Info
	}
}

impl Display for LogLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Trace => write!(f, "trace"),
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warn => write!(f, "warn"),
			Self::Error => write!(f, "error"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LoggingPreset {
	Default,
	Verbose,
	Develop,
	Trace,
}

impl Default for LoggingPreset {
	fn default() -> Self {
		return Self::Default;
	}
}

impl LoggingPreset {
	pub fn get_config(&self) -> LoggingConfig {
		match self {
			Self::Default => LoggingConfig {
				other: LogLevel::Warn,
				node: LogLevel::Info,
				runner: LogLevel::Info,
				routines: LogLevel::Warn,
			},

			Self::Verbose => LoggingConfig {
				other: LogLevel::Warn,
				node: LogLevel::Debug,
				runner: LogLevel::Debug,
				routines: LogLevel::Info,
			},

			Self::Develop => LoggingConfig {
				other: LogLevel::Debug,
				node: LogLevel::Trace,
				runner: LogLevel::Trace,
				routines: LogLevel::Debug,
			},

			Self::Trace => LoggingConfig {
				other: LogLevel::Trace,
				node: LogLevel::Trace,
				runner: LogLevel::Trace,
				routines: LogLevel::Trace,
			},
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct LoggingConfig {
	other: LogLevel,

	/// Declarations, graph construction and invocations
	node: LogLevel,

	/// The reference driver
	runner: LogLevel,

	/// Messages sent through a node's logger handle
	routines: LogLevel,
}

impl LoggingConfig {
	/// The filter directives for this config, most specific first
	pub fn directives(&self) -> String {
		[
			format!("nodeflow_node::routine={}", self.routines),
			format!("nodeflow_node={}", self.node),
			format!("nodeflow_runner={}", self.runner),
			self.other.to_string(),
		]
		.join(",")
	}
}

impl From<LoggingConfig> for EnvFilter {
	fn from(value: LoggingConfig) -> Self {
		EnvFilter::new(value.directives())
	}
}
