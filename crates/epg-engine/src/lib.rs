//! Graph engine access for the evaluation harness.
//!
//! This crate owns everything that talks to the outside world on behalf of
//! one transaction's dependency graph: the query-engine client, the
//! external graph-builder process, graph import/export with an on-disk
//! cache, and the memoizing trace-retrieval client.

use async_trait::async_trait;
use thiserror::Error;

/// GraphSON value untyping.
pub mod graphson;
/// Engine handle: drop/build/export/import for one transaction's graph.
pub mod handle;
/// Memoizing HTTP client for raw execution traces.
pub mod trace;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	#[cfg(any(test, feature = "testing"))]
	pub mod mock;
}

pub use handle::{BuildOptions, BuildOutcome, GraphEngineHandle};
pub use trace::TraceClient;

/// Errors surfaced by a graph query client.
#[derive(Debug, Error)]
pub enum GraphClientError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The engine aborted query evaluation at its configured deadline.
	#[error("Query evaluation timed out")]
	Timeout,
	/// The engine returned a response the client could not interpret.
	#[error("Protocol error: {0}")]
	Protocol(String),
	/// The engine rejected or failed the query.
	#[error("Server error: {0}")]
	Server(String),
}

/// Errors that can occur during engine handle operations.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Error propagated from the query client.
	#[error("Graph client error: {0}")]
	Client(#[from] GraphClientError),
	/// Dropping the graph left vertices behind. Fatal: a leaked graph would
	/// corrupt every subsequent detection on this engine.
	#[error("Graph drop left {0} vertices in the engine")]
	DropVerification(i64),
	/// The builder process could not be spawned or inspected.
	#[error("Builder process error: {0}")]
	Builder(String),
	/// Trace retrieval failed after a retry.
	#[error("Trace retrieval failed: {0}")]
	Trace(String),
	/// An engine response had an unexpected shape.
	#[error("Unexpected engine response: {0}")]
	UnexpectedResponse(String),
}

/// Trait defining the interface to a graph query engine.
///
/// Implementations submit one traversal script and return the flattened
/// result list. A client is bound to a single engine instance; exclusivity
/// across concurrent tasks is the caller's responsibility.
#[async_trait]
pub trait GraphClient: Send + Sync {
	/// Submits a traversal script and returns the result values.
	///
	/// Engine-side evaluation deadlines are expressed inside the script
	/// itself; a deadline hit must surface as [`GraphClientError::Timeout`].
	async fn execute(&self, script: &str) -> Result<Vec<serde_json::Value>, GraphClientError>;

	/// The endpoint this client is connected to.
	fn endpoint(&self) -> &str;
}
