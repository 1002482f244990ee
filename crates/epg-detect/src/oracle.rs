//! Oracle manipulation detection.
//!
//! Four independent queries feed one decision rule. The transaction is
//! flagged when a manipulable price slot coincides with both a swap and a
//! borrow, or when any manipulable slot is rewritten at least
//! `price_change_threshold` times regardless of transaction structure.

use crate::{patterns, script::Traversal, AttackDetector, DetectError};
use async_trait::async_trait;
use epg_config::DetectionConfig;
use epg_engine::{GraphClientError, GraphEngineHandle};
use epg_types::{AttackKind, DetectStatus, Detection};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

pub struct OracleManipulationDetector {
	evaluation_timeout_ms: u64,
	price_change_threshold: i64,
}

/// One query outcome: values, or the engine hit its evaluation deadline.
enum QueryOutcome {
	Values(Vec<Value>),
	Timeout,
}

impl OracleManipulationDetector {
	pub fn new(config: &DetectionConfig) -> Self {
		Self {
			evaluation_timeout_ms: config.oracle_timeout_ms,
			price_change_threshold: config.price_change_threshold,
		}
	}

	fn source(&self) -> Traversal {
		Traversal::source_with_timeout(self.evaluation_timeout_ms)
	}

	async fn run(
		&self,
		handle: &GraphEngineHandle,
		query: Traversal,
	) -> Result<QueryOutcome, DetectError> {
		match handle.execute(&query.script()).await {
			Ok(values) => Ok(QueryOutcome::Values(values)),
			Err(GraphClientError::Timeout) => {
				tracing::warn!(endpoint = handle.endpoint(), "oracle query timed out");
				Ok(QueryOutcome::Timeout)
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Runs a count-terminated query and reads its single number.
	async fn run_count(
		&self,
		handle: &GraphEngineHandle,
		query: Traversal,
		what: &'static str,
	) -> Result<Option<i64>, DetectError> {
		match self.run(handle, query).await? {
			QueryOutcome::Timeout => Ok(None),
			QueryOutcome::Values(values) => values
				.first()
				.and_then(Value::as_i64)
				.ok_or(DetectError::UnexpectedResult(what))
				.map(Some),
		}
	}
}

#[async_trait]
impl AttackDetector for OracleManipulationDetector {
	fn kind(&self) -> AttackKind {
		AttackKind::OracleManipulation
	}

	async fn detect(
		&self,
		handle: &GraphEngineHandle,
		attack: AttackKind,
		_logfile: Option<&Path>,
	) -> Result<Detection, DetectError> {
		if attack != AttackKind::OracleManipulation {
			return Ok(Detection::unsupported());
		}

		let tic = Instant::now();

		let manipulable = match self
			.run_count(
				handle,
				patterns::oracle_manipulable_price(self.source()).limit(1).count(),
				"manipulable price count",
			)
			.await?
		{
			Some(count) => count,
			None => return Ok(Detection::timeout()),
		};

		// At most one value: the maximum rewrite count over manipulable
		// slots. An empty result means no manipulable slot exists.
		let price_change_times =
			match self.run(handle, patterns::oracle_price_change_times(self.source())).await? {
				QueryOutcome::Timeout => return Ok(Detection::timeout()),
				QueryOutcome::Values(values) => values.first().and_then(Value::as_i64),
			};

		let has_swap = match self
			.run_count(handle, patterns::oracle_has_swap(self.source()), "swap count")
			.await?
		{
			Some(count) => count > 0,
			None => return Ok(Detection::timeout()),
		};

		let has_borrow = match self
			.run_count(handle, patterns::oracle_has_borrow(self.source()), "borrow count")
			.await?
		{
			Some(count) => count > 0,
			None => return Ok(Detection::timeout()),
		};

		let mut detected = manipulable > 0 && has_swap && has_borrow;
		if let Some(times) = price_change_times {
			if times >= self.price_change_threshold {
				detected = true;
			}
		}

		let seconds = tic.elapsed().as_secs_f64();
		tracing::debug!(
			manipulable,
			?price_change_times,
			has_swap,
			has_borrow,
			detected,
			"oracle checks"
		);

		Ok(Detection {
			status: DetectStatus::Completed { seconds },
			detected,
			candidates: Vec::new(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use epg_engine::implementations::mock::{MockGraphClient, MockResponse, SharedMock};
	use serde_json::json;
	use std::path::PathBuf;
	use std::sync::Arc;

	// Needles unique to each of the four queries.
	const MANIPULABLE: &str = ".elementMap().limit(1).count()";
	const CHANGE_TIMES: &str = "group().by('sourceId')";
	const SWAP: &str = "has('from', __.select('token2').values('to'))";
	const BORROW: &str = "has('to', __.select('token1').values('from'))";

	fn mock_handle() -> (GraphEngineHandle, Arc<MockGraphClient>) {
		let mock = Arc::new(MockGraphClient::new());
		let handle = GraphEngineHandle::new(
			Box::new(SharedMock(mock.clone())),
			PathBuf::from("/bin/true"),
			PathBuf::from("/tmp"),
			"/exported-graphs".to_string(),
		);
		(handle, mock)
	}

	fn detector() -> OracleManipulationDetector {
		OracleManipulationDetector::new(&DetectionConfig::default())
	}

	fn arm_structure_checks(mock: &MockGraphClient) {
		mock.when(MANIPULABLE, MockResponse::Values(vec![json!(1)]));
		mock.when(SWAP, MockResponse::Values(vec![json!(1)]));
		mock.when(BORROW, MockResponse::Values(vec![json!(1)]));
	}

	#[tokio::test]
	async fn test_price_swap_and_borrow_together_detect() {
		let (handle, mock) = mock_handle();
		arm_structure_checks(&mock);

		let detection = detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		assert!(detection.detected);
		assert!(matches!(detection.status, DetectStatus::Completed { .. }));
	}

	#[tokio::test]
	async fn test_each_missing_check_flips_the_verdict() {
		for disabled in [MANIPULABLE, SWAP, BORROW] {
			let (handle, mock) = mock_handle();
			for needle in [MANIPULABLE, SWAP, BORROW] {
				let count = if needle == disabled { 0 } else { 1 };
				mock.when(needle, MockResponse::Values(vec![json!(count)]));
			}

			let detection = detector()
				.detect(&handle, AttackKind::OracleManipulation, None)
				.await
				.unwrap();
			assert!(!detection.detected, "disabled check {disabled}");
		}
	}

	#[tokio::test]
	async fn test_price_change_threshold_detects_alone() {
		let (handle, mock) = mock_handle();
		mock.when(CHANGE_TIMES, MockResponse::Values(vec![json!(10)]));

		let detection = detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		assert!(detection.detected);
	}

	#[tokio::test]
	async fn test_below_threshold_change_count_is_benign() {
		let (handle, mock) = mock_handle();
		mock.when(CHANGE_TIMES, MockResponse::Values(vec![json!(9)]));

		let detection = detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		assert!(!detection.detected);
	}

	#[tokio::test]
	async fn test_empty_graph_is_benign() {
		let (handle, _mock) = mock_handle();

		let detection = detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		assert!(!detection.detected);
		assert!(matches!(detection.status, DetectStatus::Completed { .. }));
	}

	#[tokio::test]
	async fn test_all_four_queries_run() {
		let (handle, mock) = mock_handle();
		arm_structure_checks(&mock);

		detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		let scripts = mock.executed_scripts();
		assert_eq!(scripts.len(), 4);
		for (script, needle) in scripts.iter().zip([MANIPULABLE, CHANGE_TIMES, SWAP, BORROW]) {
			assert!(script.starts_with("g.with('evaluationTimeout', 600000)"));
			assert!(script.contains(needle));
		}
	}

	#[tokio::test]
	async fn test_engine_timeout_is_a_verdict() {
		let (handle, mock) = mock_handle();
		mock.when(MANIPULABLE, MockResponse::Timeout);

		let detection = detector()
			.detect(&handle, AttackKind::OracleManipulation, None)
			.await
			.unwrap();
		assert_eq!(detection.status, DetectStatus::Timeout);
		assert!(!detection.detected);
	}

	#[tokio::test]
	async fn test_wrong_attack_kind_is_unsupported() {
		let (handle, mock) = mock_handle();

		let detection = detector()
			.detect(&handle, AttackKind::Reentrancy, None)
			.await
			.unwrap();
		assert_eq!(detection.status, DetectStatus::Unsupported);
		assert!(mock.executed_scripts().is_empty());
	}
}
