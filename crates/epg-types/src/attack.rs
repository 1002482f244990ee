//! Attack kinds supported by the detection engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The attack patterns the harness knows how to detect.
///
/// The string form matches the attack-type argument accepted on the command
/// line and used in per-transaction log file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackKind {
	/// Nested-call re-entry before a guarding state update.
	Reentrancy,
	/// Manipulation of a price source read within the same transaction.
	OracleManipulation,
}

impl AttackKind {
	/// Stable lowercase name, used in CLI arguments and log file names.
	pub fn as_str(&self) -> &'static str {
		match self {
			AttackKind::Reentrancy => "reentrancy",
			AttackKind::OracleManipulation => "oracle",
		}
	}
}

impl fmt::Display for AttackKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AttackKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"reentrancy" => Ok(AttackKind::Reentrancy),
			"oracle" => Ok(AttackKind::OracleManipulation),
			other => Err(format!("unknown attack kind: {}", other)),
		}
	}
}
