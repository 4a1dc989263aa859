use nodeflow_util::logging::LoggingPreset;
use serde::Deserialize;

/// Environment variables read by [`RunnerConfig`] start with this prefix.
pub const ENV_PREFIX: &str = "NODEFLOW_";

/// Note that the fields of this struct are not capitalized.
/// Envy is case-insensitive, and expects Rust fields to be snake_case.
/// With [`ENV_PREFIX`], `max_steps` is read from `NODEFLOW_MAX_STEPS`.
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
	/// The logging level to run with
	#[serde(default)]
	pub loglevel: LoggingPreset,

	/// The maximum number of requests one invocation may issue.
	/// Plain routines that never return are stopped here.
	#[serde(default = "RunnerConfig::default_max_steps")]
	pub max_steps: usize,
}

impl RunnerConfig {
	fn default_max_steps() -> usize {
		10_000
	}
}

impl Default for RunnerConfig {
	fn default() -> Self {
		Self {
			loglevel: LoggingPreset::default(),
			max_steps: Self::default_max_steps(),
		}
	}
}
