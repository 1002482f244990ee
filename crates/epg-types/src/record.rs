//! Traversal result records and per-transaction evaluation rows.

use crate::dcfg::{DcfgId, DcfgIdError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Opaque transaction identifier (`0x`-prefixed hex string).
pub type TxHash = String;

/// Property map of a single graph element, as returned by `elementMap()`.
pub type ElementMap = serde_json::Map<String, serde_json::Value>;

/// Errors produced when reading properties out of a traversal record.
#[derive(Debug, Error)]
pub enum RecordError {
	/// The record has no entry for the named traversal step.
	#[error("traversal record has no step '{0}'")]
	MissingStep(String),
	/// The step's element map lacks the named property.
	#[error("step '{0}' has no '{1}' property")]
	MissingProperty(String, String),
	/// A dcfgId property failed to parse.
	#[error("step '{0}' carries an invalid dcfg id")]
	InvalidDcfgId(String, #[source] DcfgIdError),
}

/// One structured result of a multi-hop traversal: a mapping from named
/// traversal steps to the matched elements' property maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalRecord {
	steps: BTreeMap<String, ElementMap>,
}

impl TraversalRecord {
	pub fn new(steps: BTreeMap<String, ElementMap>) -> Self {
		Self { steps }
	}

	/// Interprets a raw engine result value as a traversal record.
	///
	/// Returns `None` when the value is not an object of objects, which
	/// means the query produced something other than a step selection.
	pub fn from_value(value: &serde_json::Value) -> Option<Self> {
		let object = value.as_object()?;
		let mut steps = BTreeMap::new();
		for (name, element) in object {
			steps.insert(name.clone(), element.as_object()?.clone());
		}
		Some(Self { steps })
	}

	pub fn step(&self, name: &str) -> Option<&ElementMap> {
		self.steps.get(name)
	}

	/// Reads a string property from the named step.
	pub fn property(&self, step: &str, key: &str) -> Result<&str, RecordError> {
		let element = self
			.steps
			.get(step)
			.ok_or_else(|| RecordError::MissingStep(step.to_string()))?;
		element
			.get(key)
			.and_then(|v| v.as_str())
			.ok_or_else(|| RecordError::MissingProperty(step.to_string(), key.to_string()))
	}

	/// Parses the `dcfgId` property of the named step.
	pub fn dcfg_id(&self, step: &str) -> Result<DcfgId, RecordError> {
		self.property(step, "dcfgId")?
			.parse()
			.map_err(|e| RecordError::InvalidDcfgId(step.to_string(), e))
	}
}

/// Terminal status of one detection pass over a built graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectStatus {
	/// The traversal queries completed within the evaluation deadline.
	Completed {
		/// Wall-clock query time in seconds.
		seconds: f64,
	},
	/// The engine aborted query evaluation at its deadline. Distinct from a
	/// negative result: nothing was established about the transaction.
	Timeout,
	/// The detector was invoked for an attack kind it does not implement.
	Unsupported,
}

impl DetectStatus {
	/// Query time for a completed pass, `None` for error statuses.
	pub fn seconds(&self) -> Option<f64> {
		match self {
			DetectStatus::Completed { seconds } => Some(*seconds),
			_ => None,
		}
	}
}

/// Outcome of one detection pass: status, verdict and (when a log file was
/// requested) the matching candidate records.
#[derive(Debug, Clone)]
pub struct Detection {
	pub status: DetectStatus,
	pub detected: bool,
	pub candidates: Vec<TraversalRecord>,
}

impl Detection {
	pub fn timeout() -> Self {
		Self {
			status: DetectStatus::Timeout,
			detected: false,
			candidates: Vec::new(),
		}
	}

	pub fn unsupported() -> Self {
		Self {
			status: DetectStatus::Unsupported,
			detected: false,
			candidates: Vec::new(),
		}
	}
}

/// One row of the evaluation output: what happened for one transaction.
///
/// `traverse_time` is `None` whenever the graph build or the detection did
/// not complete; such rows stay in the output so downstream analysis can
/// tell measurement failures from true negatives. `timed_out` separates the
/// rows where detection hit the engine's evaluation deadline from rows
/// where the graph never got built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
	pub tx_hash: TxHash,
	pub traverse_time: Option<f64>,
	pub is_attack: bool,
	pub detect_attack: bool,
	pub timed_out: bool,
	pub logfile: Option<PathBuf>,
}
