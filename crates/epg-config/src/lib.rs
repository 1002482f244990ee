//! Configuration for the evaluation harness.
//!
//! Configuration is loaded from a TOML file and validated on load. It names
//! the graph-engine endpoints, the external builder binary, detection
//! deadlines and the dataset files; everything else (dataset choice, output
//! paths, parallelism) is decided per run on the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Graph engine endpoints and builder binding.
	pub engine: EngineConfig,
	/// Detection deadlines and pattern bounds.
	#[serde(default)]
	pub detection: DetectionConfig,
	/// Dataset file locations.
	pub datasets: DatasetFiles,
	/// Optional trace-retrieval client configuration.
	pub trace: Option<TraceConfig>,
}

/// Graph engine endpoints and the external builder binding.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Query endpoints, one per engine instance. Parallel runs bind one
	/// worker to each endpoint.
	pub endpoints: Vec<String>,
	/// Path to the external graph-builder binary.
	pub builder_path: PathBuf,
	/// Harness-local directory holding exported graph files.
	pub exported_graph_dir: PathBuf,
	/// Engine-side path prefix for graph import/export. The engine resolves
	/// io() paths in its own filesystem namespace, which usually differs
	/// from `exported_graph_dir`.
	#[serde(default = "default_io_prefix")]
	pub io_prefix: String,
	/// Deadline in seconds for one builder invocation.
	#[serde(default = "default_build_timeout_secs")]
	pub build_timeout_secs: u64,
}

fn default_io_prefix() -> String {
	"/exported-graphs".to_string()
}

fn default_build_timeout_secs() -> u64 {
	180
}

/// Detection deadlines and pattern bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
	/// Engine-side evaluation deadline for reentrancy queries, milliseconds.
	#[serde(default = "default_reentrancy_timeout_ms")]
	pub reentrancy_timeout_ms: u64,
	/// Engine-side evaluation deadline for oracle queries, milliseconds.
	#[serde(default = "default_oracle_timeout_ms")]
	pub oracle_timeout_ms: u64,
	/// Bound on attacker/victim call pairs examined per pattern.
	#[serde(default = "default_pair_limit")]
	pub pair_limit: u64,
	/// Price-slot rewrite count treated as manipulation on its own.
	#[serde(default = "default_price_change_threshold")]
	pub price_change_threshold: i64,
}

impl Default for DetectionConfig {
	fn default() -> Self {
		Self {
			reentrancy_timeout_ms: default_reentrancy_timeout_ms(),
			oracle_timeout_ms: default_oracle_timeout_ms(),
			pair_limit: default_pair_limit(),
			price_change_threshold: default_price_change_threshold(),
		}
	}
}

fn default_reentrancy_timeout_ms() -> u64 {
	300_000
}

fn default_oracle_timeout_ms() -> u64 {
	600_000
}

fn default_pair_limit() -> u64 {
	500
}

fn default_price_change_threshold() -> i64 {
	10
}

/// Locations of the transaction-hash list files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetFiles {
	/// Ground-truth reentrancy attack transactions.
	pub reentrancy: PathBuf,
	/// Ground-truth oracle-manipulation attack transactions.
	pub oracle: PathBuf,
	/// Random background transactions.
	pub random: PathBuf,
}

/// Trace-retrieval client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceConfig {
	/// Base URL of the trace API; the transaction hash is appended.
	pub api_url: String,
	/// Directory for the on-disk trace cache.
	pub cache_dir: PathBuf,
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		Self::from_toml_str(&content)
	}

	/// Async variant of [`Config::from_file`].
	pub async fn from_file_async(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		Self::from_toml_str(&content)
	}

	fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks the invariants the rest of the harness relies on.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.endpoints.is_empty() {
			return Err(ConfigError::Validation(
				"engine.endpoints must name at least one endpoint".into(),
			));
		}
		if self.engine.build_timeout_secs == 0 {
			return Err(ConfigError::Validation(
				"engine.build_timeout_secs must be nonzero".into(),
			));
		}
		if self.detection.reentrancy_timeout_ms == 0 || self.detection.oracle_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"detection timeouts must be nonzero".into(),
			));
		}
		if self.detection.pair_limit == 0 {
			return Err(ConfigError::Validation(
				"detection.pair_limit must be nonzero".into(),
			));
		}
		Ok(())
	}
}
