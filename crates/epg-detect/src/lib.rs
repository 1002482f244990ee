//! Attack detectors: traversal patterns plus the decision rules that turn
//! query results into a verdict for one built graph.
//!
//! Detectors do not build or drop graphs; they run against whatever graph
//! the handle currently holds. Engine-side evaluation timeouts are verdicts
//! ([`epg_types::DetectStatus::Timeout`]), not errors: the transaction
//! stays in the output with nothing established about it.

pub mod oracle;
pub mod patterns;
pub mod reentrancy;
pub mod script;

pub use oracle::OracleManipulationDetector;
pub use reentrancy::ReentrancyDetector;

use async_trait::async_trait;
use epg_engine::{GraphClientError, GraphEngineHandle};
use epg_types::{AttackKind, Detection, RecordError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while running detection queries.
///
/// Engine-side evaluation timeouts are not represented here; detectors
/// convert them into a [`Detection`] with timeout status.
#[derive(Debug, Error)]
pub enum DetectError {
	/// A query failed for a reason other than the evaluation deadline.
	#[error("graph query failed: {0}")]
	Client(#[from] GraphClientError),
	/// A traversal record could not be interpreted.
	#[error(transparent)]
	Record(#[from] RecordError),
	/// A query returned a shape the decision rule cannot read.
	#[error("unexpected query result for {0}")]
	UnexpectedResult(&'static str),
	/// The candidate log file could not be written.
	#[error("failed to write log file {0}: {1}")]
	Logfile(PathBuf, #[source] std::io::Error),
}

/// A detection strategy for one attack kind.
#[async_trait]
pub trait AttackDetector: Send + Sync {
	/// The attack kind this detector implements.
	fn kind(&self) -> AttackKind;

	/// Runs the detection queries against the graph currently resident in
	/// the engine behind `handle`.
	///
	/// `attack` is the kind the caller is evaluating; a detector invoked
	/// for a kind it does not implement returns an unsupported detection.
	/// When `logfile` is set, all matching candidates are collected and
	/// written there instead of short-circuiting on the first match.
	async fn detect(
		&self,
		handle: &GraphEngineHandle,
		attack: AttackKind,
		logfile: Option<&Path>,
	) -> Result<Detection, DetectError>;
}
