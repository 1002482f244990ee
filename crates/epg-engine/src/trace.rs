//! Memoizing client for raw execution traces.
//!
//! Trace bodies are keyed by transaction hash in an on-disk cache; a miss
//! fetches from the trace API with a single retry. The cache is shared with
//! the external builder, which consumes the same trace files.

use crate::EngineError;
use epg_config::TraceConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Delay before the single retry of a failed trace request.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// HTTP trace client with an on-disk cache.
pub struct TraceClient {
	http: reqwest::Client,
	api_url: String,
	cache_dir: PathBuf,
}

impl TraceClient {
	pub fn new(config: &TraceConfig) -> Self {
		Self {
			http: reqwest::Client::new(),
			api_url: config.api_url.trim_end_matches('/').to_string(),
			cache_dir: config.cache_dir.clone(),
		}
	}

	fn cache_path(&self, tx_hash: &str) -> PathBuf {
		self.cache_dir.join(format!("{}.json", tx_hash))
	}

	async fn fetch(&self, url: &str) -> Result<Option<String>, EngineError> {
		let response = self
			.http
			.get(url)
			.send()
			.await
			.map_err(|e| EngineError::Trace(e.to_string()))?;
		if !response.status().is_success() {
			return Ok(None);
		}
		let body = response
			.text()
			.await
			.map_err(|e| EngineError::Trace(e.to_string()))?;
		Ok(Some(body))
	}

	/// Returns the trace body for a transaction, from cache when possible.
	///
	/// Cache files appear atomically (temp file plus rename); the external
	/// builder may read the cache directory concurrently.
	pub async fn get_trace(&self, tx_hash: &str) -> Result<String, EngineError> {
		let path = self.cache_path(tx_hash);
		if let Ok(cached) = tokio::fs::read_to_string(&path).await {
			return Ok(cached);
		}

		let url = format!("{}/{}", self.api_url, tx_hash);
		let body = match self.fetch(&url).await? {
			Some(body) => body,
			None => {
				tracing::warn!(tx_hash, "trace request failed, retrying once");
				tokio::time::sleep(RETRY_DELAY).await;
				self.fetch(&url).await?.ok_or_else(|| {
					EngineError::Trace(format!("no trace for {} at {}", tx_hash, url))
				})?
			}
		};

		tokio::fs::create_dir_all(&self.cache_dir)
			.await
			.map_err(|e| EngineError::Trace(e.to_string()))?;
		let temp = path.with_extension("tmp");
		tokio::fs::write(&temp, &body)
			.await
			.map_err(|e| EngineError::Trace(e.to_string()))?;
		tokio::fs::rename(&temp, &path)
			.await
			.map_err(|e| EngineError::Trace(e.to_string()))?;

		Ok(body)
	}
}
