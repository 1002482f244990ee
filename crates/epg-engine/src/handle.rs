//! Engine handle: single point of control for one query-engine connection
//! plus one builder-process binding.
//!
//! A handle is not safe for concurrent use: every operation mutates the
//! engine-resident graph. The runner guarantees that at most one task uses
//! a handle at a time.

use crate::{EngineError, GraphClient};
use epg_config::EngineConfig;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How one graph build request should behave.
#[derive(Debug, Clone)]
pub struct BuildOptions {
	/// Import from / export to the on-disk graph cache.
	pub use_cache: bool,
	/// Deadline for one builder-process invocation.
	pub timeout: Duration,
	/// Optional cache subdirectory under the exported-graph directory.
	pub cache_dir: Option<String>,
}

impl BuildOptions {
	pub fn new(timeout: Duration) -> Self {
		Self {
			use_cache: true,
			timeout,
			cache_dir: None,
		}
	}
}

/// Terminal outcome of one graph build request.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
	/// The graph is resident in the engine.
	Completed {
		/// Wall-clock build (or cache import) time in seconds.
		seconds: f64,
		/// The graph came from the cache; no builder process ran.
		from_cache: bool,
	},
	/// The builder process exceeded its deadline. No usable graph state.
	Timeout,
	/// The builder process exited nonzero. No usable graph state.
	Failed,
}

/// Wraps one graph-engine connection and one builder binding.
pub struct GraphEngineHandle {
	client: Box<dyn GraphClient>,
	builder_path: PathBuf,
	exported_graph_dir: PathBuf,
	io_prefix: String,
}

impl GraphEngineHandle {
	pub fn new(
		client: Box<dyn GraphClient>,
		builder_path: PathBuf,
		exported_graph_dir: PathBuf,
		io_prefix: String,
	) -> Self {
		Self {
			client,
			builder_path,
			exported_graph_dir,
			io_prefix,
		}
	}

	/// Builds a handle for one endpoint of the engine configuration.
	pub fn for_endpoint(config: &EngineConfig, client: Box<dyn GraphClient>) -> Self {
		Self::new(
			client,
			config.builder_path.clone(),
			config.exported_graph_dir.clone(),
			config.io_prefix.clone(),
		)
	}

	pub fn endpoint(&self) -> &str {
		self.client.endpoint()
	}

	/// Submits a traversal script to the engine.
	pub async fn execute(&self, script: &str) -> Result<Vec<Value>, crate::GraphClientError> {
		self.client.execute(script).await
	}

	/// Number of vertices currently resident in the engine.
	pub async fn vertex_count(&self) -> Result<i64, EngineError> {
		let values = self.client.execute("g.V().count()").await?;
		values
			.first()
			.and_then(Value::as_i64)
			.ok_or_else(|| EngineError::UnexpectedResponse("vertex count".into()))
	}

	/// Removes all graph state from the engine and verifies the removal.
	///
	/// A nonzero post-drop count is fatal: building on top of unverified
	/// engine state would corrupt every subsequent detection.
	pub async fn drop_graph(&self) -> Result<(), EngineError> {
		tracing::debug!(endpoint = self.endpoint(), "drop graph");
		self.client.execute("g.V().drop().iterate()").await?;
		let remaining = self.vertex_count().await?;
		if remaining != 0 {
			return Err(EngineError::DropVerification(remaining));
		}
		Ok(())
	}

	fn io_script(&self, name: &str, verb: &str) -> String {
		let path = format!("{}/{}", self.io_prefix, name).replace('\'', "\\'");
		format!("g.io('{}').{}().iterate()", path, verb)
	}

	/// Serializes the engine's current graph to a named file.
	pub async fn export_graph(&self, name: &str) -> Result<(), EngineError> {
		tracing::debug!(endpoint = self.endpoint(), name, "export graph");
		self.client.execute(&self.io_script(name, "write")).await?;
		Ok(())
	}

	/// Restores a previously exported graph into the engine.
	pub async fn import_graph(&self, name: &str) -> Result<(), EngineError> {
		tracing::debug!(endpoint = self.endpoint(), name, "import graph");
		self.client.execute(&self.io_script(name, "read")).await?;
		Ok(())
	}

	/// Makes the transaction's dependency graph resident in the engine.
	///
	/// Prefers a cached export when allowed; otherwise runs the external
	/// builder under the configured deadline and, on success, populates the
	/// cache. Build timeouts and failures are outcomes, not errors: the
	/// caller records them and moves on to the next transaction.
	pub async fn build_graph(
		&self,
		tx_hash: &str,
		options: &BuildOptions,
	) -> Result<BuildOutcome, EngineError> {
		let cache_name = match &options.cache_dir {
			Some(dir) => format!("{}/{}.xml", dir, tx_hash),
			None => format!("{}.xml", tx_hash),
		};

		if options.use_cache && self.exported_graph_dir.join(&cache_name).is_file() {
			let tic = Instant::now();
			self.import_graph(&cache_name).await?;
			let seconds = tic.elapsed().as_secs_f64();
			tracing::debug!(tx_hash, seconds, "loaded graph from cache");
			return Ok(BuildOutcome::Completed {
				seconds,
				from_cache: true,
			});
		}

		let mut command = Command::new(&self.builder_path);
		command
			.arg("build")
			.arg("--remote")
			.arg(self.endpoint())
			.arg("--time")
			.arg("--tx")
			.arg(tx_hash)
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		tracing::debug!(tx_hash, builder = %self.builder_path.display(), "build graph");
		let tic = Instant::now();
		let output = match tokio::time::timeout(options.timeout, command.output()).await {
			Ok(result) => result.map_err(|e| EngineError::Builder(e.to_string()))?,
			Err(_) => {
				tracing::error!(
					tx_hash,
					timeout_secs = options.timeout.as_secs(),
					"graph build timed out"
				);
				return Ok(BuildOutcome::Timeout);
			}
		};
		let seconds = tic.elapsed().as_secs_f64();

		if !output.status.success() {
			tracing::error!(
				tx_hash,
				status = %output.status,
				stderr = %String::from_utf8_lossy(&output.stderr),
				"graph build failed"
			);
			return Ok(BuildOutcome::Failed);
		}

		if options.use_cache {
			self.export_graph(&cache_name).await?;
		}

		tracing::debug!(tx_hash, seconds, "graph build completed");
		Ok(BuildOutcome::Completed {
			seconds,
			from_cache: false,
		})
	}
}
