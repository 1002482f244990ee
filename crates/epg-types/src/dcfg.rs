//! Trace-position identifiers for dynamic control-flow graph nodes.
//!
//! A [`DcfgId`] names one point in the dynamic control-flow trace of a
//! transaction. Its string form is `<call path>-<step>-<call count>`, where
//! the call path is `0` for the root frame or `0:c1:...:cn` for a nested
//! frame, `step` is the node index inside that frame, and `call count` is
//! the number of sub-calls the frame had issued when the node executed.
//!
//! The ordering is a strict total order consistent with execution order:
//! comparing a node against a node in a nested frame uses the caller-side
//! call count to decide whether the nested frame was entered before or
//! after the caller's position.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a [`DcfgId`] from its string form.
#[derive(Debug, Error)]
pub enum DcfgIdError {
	/// The identifier does not have the `<call path>-<step>-<count>` shape.
	#[error("malformed dcfg id: {0}")]
	Malformed(String),
	/// A path or index component is not an integer.
	#[error("invalid component in dcfg id {0}: {1}")]
	InvalidComponent(String, #[source] std::num::ParseIntError),
}

/// A totally ordered position in the dynamic control-flow trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfgId {
	/// Branch indices from the root frame down to the owning frame.
	call_path: Vec<i64>,
	/// Node index within the owning frame.
	step: i64,
	/// Sub-calls issued by the owning frame before this node executed.
	call_count: i64,
}

impl DcfgId {
	pub fn new(call_path: Vec<i64>, step: i64, call_count: i64) -> Self {
		Self {
			call_path,
			step,
			call_count,
		}
	}

	pub fn call_path(&self) -> &[i64] {
		&self.call_path
	}

	pub fn step(&self) -> i64 {
		self.step
	}

	pub fn call_count(&self) -> i64 {
		self.call_count
	}

	fn common_prefix_len(&self, other: &Self) -> usize {
		self.call_path
			.iter()
			.zip(other.call_path.iter())
			.take_while(|(a, b)| a == b)
			.count()
	}
}

impl PartialEq for DcfgId {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for DcfgId {}

impl PartialOrd for DcfgId {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for DcfgId {
	fn cmp(&self, other: &Self) -> Ordering {
		let common = self.common_prefix_len(other);
		let depth = self.call_path.len();
		let other_depth = other.call_path.len();
		// One frame encloses the other.
		if common == depth || common == other_depth {
			if depth == other_depth {
				// Same frame: plain step order. The call count is derived
				// from the step and carries no extra information here.
				return self.step.cmp(&other.step);
			}
			if depth > other_depth {
				// Self sits in a call made by other's frame. The branch
				// index at the caller's depth tells which sub-call it was;
				// the caller's call count tells how many sub-calls had been
				// issued when the caller's node executed.
				if self.call_path[other_depth] < other.call_count {
					return Ordering::Less;
				}
				return Ordering::Greater;
			}
			if self.call_count <= other.call_path[depth] {
				return Ordering::Less;
			}
			return Ordering::Greater;
		}
		// Diverging frames: the sibling call order decides.
		self.call_path.cmp(&other.call_path)
	}
}

impl fmt::Display for DcfgId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0")?;
		for branch in &self.call_path {
			write!(f, ":{}", branch)?;
		}
		write!(f, "-{}-{}", self.step, self.call_count)
	}
}

impl FromStr for DcfgId {
	type Err = DcfgIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let malformed = || DcfgIdError::Malformed(s.to_string());
		let parse = |part: &str| {
			part.parse::<i64>()
				.map_err(|e| DcfgIdError::InvalidComponent(s.to_string(), e))
		};

		let (path_part, rest) = s.split_once('-').ok_or_else(malformed)?;
		let (step_part, count_part) = rest.split_once('-').ok_or_else(malformed)?;

		// Leading 0 names the root call frame.
		let mut segments = path_part.split(':');
		if segments.next() != Some("0") {
			return Err(malformed());
		}
		let call_path = segments.map(parse).collect::<Result<Vec<_>, _>>()?;

		Ok(DcfgId {
			call_path,
			step: parse(step_part)?,
			call_count: parse(count_part)?,
		})
	}
}
