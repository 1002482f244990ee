//! Common types for the execution-property-graph evaluation harness.
//!
//! This crate defines the data types shared by the engine, detector and
//! runner crates: attack kinds, trace-position identifiers, traversal
//! result records and per-transaction evaluation records.

/// Attack kinds the harness can evaluate.
pub mod attack;
/// Totally ordered dynamic-control-flow-graph position identifiers.
pub mod dcfg;
/// Traversal result records and evaluation rows.
pub mod record;

pub use attack::AttackKind;
pub use dcfg::{DcfgId, DcfgIdError};
pub use record::{
	Detection, DetectStatus, ElementMap, EvaluationRecord, RecordError, TraversalRecord, TxHash,
};
