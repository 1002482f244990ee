//! Reentrancy detection.
//!
//! Two patterns feed one candidate stream: the amount-dependency variant
//! first, then the control-dependency variant. A candidate is an attack
//! when the guarded transfer executes before the write it depends on,
//! decided by comparing the two instructions' graph positions. Without a
//! log file the first confirmed candidate short-circuits both patterns.

use crate::{patterns, script::Traversal, AttackDetector, DetectError};
use async_trait::async_trait;
use epg_config::DetectionConfig;
use epg_engine::{GraphClientError, GraphEngineHandle};
use epg_types::{AttackKind, DetectStatus, Detection, TraversalRecord};
use std::path::Path;
use std::time::Instant;

pub struct ReentrancyDetector {
	evaluation_timeout_ms: u64,
	pair_limit: u64,
}

impl ReentrancyDetector {
	pub fn new(config: &DetectionConfig) -> Self {
		Self {
			evaluation_timeout_ms: config.reentrancy_timeout_ms,
			pair_limit: config.pair_limit,
		}
	}

	fn queries(&self) -> [Traversal; 2] {
		[
			patterns::reentrancy_amount_dependency(
				Traversal::source_with_timeout(self.evaluation_timeout_ms),
				self.pair_limit,
			),
			patterns::reentrancy_control_dependency(
				Traversal::source_with_timeout(self.evaluation_timeout_ms),
				self.pair_limit,
			),
		]
	}
}

/// Confirms or rejects one candidate: true when the transfer's position
/// precedes the state change's position.
fn confirms(record: &TraversalRecord) -> Result<bool, DetectError> {
	let victim_flow = record.dcfg_id("victim_flow_dcfg")?;
	let state_change = record.dcfg_id("state_change_dcfg")?;
	Ok(victim_flow < state_change)
}

async fn write_candidates(path: &Path, candidates: &[TraversalRecord]) -> Result<(), DetectError> {
	let mut body = String::new();
	for candidate in candidates {
		let line = serde_json::to_string_pretty(candidate)
			.map_err(|e| DetectError::Logfile(path.to_path_buf(), e.into()))?;
		body.push_str(&line);
		body.push('\n');
	}
	tokio::fs::write(path, body)
		.await
		.map_err(|e| DetectError::Logfile(path.to_path_buf(), e))
}

#[async_trait]
impl AttackDetector for ReentrancyDetector {
	fn kind(&self) -> AttackKind {
		AttackKind::Reentrancy
	}

	async fn detect(
		&self,
		handle: &GraphEngineHandle,
		attack: AttackKind,
		logfile: Option<&Path>,
	) -> Result<Detection, DetectError> {
		if attack != AttackKind::Reentrancy {
			return Ok(Detection::unsupported());
		}

		let tic = Instant::now();
		let mut detected = false;
		let mut candidates = Vec::new();

		'queries: for query in self.queries() {
			let script = query.script();
			let values = match handle.execute(&script).await {
				Ok(values) => values,
				Err(GraphClientError::Timeout) => {
					tracing::warn!(endpoint = handle.endpoint(), "reentrancy query timed out");
					return Ok(Detection::timeout());
				}
				Err(e) => return Err(e.into()),
			};

			for value in &values {
				let record = TraversalRecord::from_value(value)
					.ok_or(DetectError::UnexpectedResult("reentrancy candidate"))?;
				if confirms(&record)? {
					detected = true;
					if logfile.is_some() {
						candidates.push(record);
					} else {
						break 'queries;
					}
				}
			}
		}

		let seconds = tic.elapsed().as_secs_f64();

		if detected {
			if let Some(path) = logfile {
				write_candidates(path, &candidates).await?;
			}
		}

		Ok(Detection {
			status: DetectStatus::Completed { seconds },
			detected,
			candidates,
		})
	}
}
