//! Experiment orchestration: drives drop/build/detect over a dataset and
//! collects one evaluation record per transaction.
//!
//! A run uses one engine handle sequentially, or one worker per handle in
//! parallel. Handles are never shared between in-flight transactions; the
//! engine-resident graph is the unit of isolation.

pub mod report;
pub mod summary;

pub use report::{write_csv, ReportError};
pub use summary::Summary;

use epg_dataset::AttackLabels;
use epg_detect::AttackDetector;
use epg_engine::{BuildOptions, BuildOutcome, EngineError, GraphEngineHandle};
use epg_types::{AttackKind, DetectStatus, EvaluationRecord, TxHash};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Errors that abort a run.
///
/// Per-transaction failures (build timeouts and failures, detection
/// timeouts and errors) are not here: they become records with an empty
/// traverse time and the run continues.
#[derive(Debug, Error)]
pub enum RunError {
	/// The engine could not be dropped to a verified empty state. Building
	/// on top of unverified engine state would corrupt every subsequent
	/// detection, so the run stops.
	#[error("engine failure: {0}")]
	Engine(#[from] EngineError),
	/// The runner was constructed without any engine handles.
	#[error("no engine handles configured")]
	NoHandles,
	/// A parallel worker terminated abnormally.
	#[error("worker failed: {0}")]
	Worker(String),
}

/// Immutable description of one experiment run.
#[derive(Debug, Clone)]
pub struct RunOptions {
	pub attack: AttackKind,
	pub use_cache: bool,
	pub build_timeout: Duration,
	/// Cache subdirectory under the exported-graph directory.
	pub cache_dir: Option<String>,
	/// When set, detectors write candidate logs under this directory.
	pub logfile_dir: Option<PathBuf>,
	pub show_progress: bool,
}

impl RunOptions {
	pub fn new(attack: AttackKind, build_timeout: Duration) -> Self {
		Self {
			attack,
			use_cache: true,
			build_timeout,
			cache_dir: None,
			logfile_dir: None,
			show_progress: true,
		}
	}

	fn build_options(&self) -> BuildOptions {
		BuildOptions {
			use_cache: self.use_cache,
			timeout: self.build_timeout,
			cache_dir: self.cache_dir.clone(),
		}
	}

	fn logfile_for(&self, tx_hash: &str) -> Option<PathBuf> {
		self.logfile_dir
			.as_ref()
			.map(|dir| dir.join(format!("{}-{}.log", self.attack, tx_hash)))
	}
}

/// Record for a transaction whose build or detection did not complete.
fn unmeasured(tx_hash: &str, is_attack: bool) -> EvaluationRecord {
	EvaluationRecord {
		tx_hash: tx_hash.to_string(),
		traverse_time: None,
		is_attack,
		detect_attack: false,
		timed_out: false,
		logfile: None,
	}
}

/// Evaluates one transaction end to end on one handle.
///
/// Build and detection failures are recorded, not propagated; only an
/// unverifiable engine drop is fatal.
async fn evaluate_one(
	handle: &GraphEngineHandle,
	detector: &dyn AttackDetector,
	tx_hash: &str,
	is_attack: bool,
	options: &RunOptions,
) -> Result<EvaluationRecord, RunError> {
	handle.drop_graph().await?;
	let outcome = match handle.build_graph(tx_hash, &options.build_options()).await {
		Ok(outcome) => outcome,
		Err(e) => {
			tracing::error!(tx_hash, error = %e, "graph build errored");
			return Ok(unmeasured(tx_hash, is_attack));
		}
	};
	if !matches!(outcome, BuildOutcome::Completed { .. }) {
		return Ok(unmeasured(tx_hash, is_attack));
	}

	let logfile = options.logfile_for(tx_hash);
	let detection = match detector
		.detect(handle, options.attack, logfile.as_deref())
		.await
	{
		Ok(detection) => detection,
		Err(e) => {
			tracing::error!(tx_hash, error = %e, "detection errored");
			return Ok(unmeasured(tx_hash, is_attack));
		}
	};
	tracing::info!(
		tx_hash,
		detected = detection.detected,
		status = ?detection.status,
		"evaluated transaction"
	);

	Ok(EvaluationRecord {
		tx_hash: tx_hash.to_string(),
		traverse_time: detection.status.seconds(),
		is_attack,
		detect_attack: detection.detected,
		timed_out: detection.status == DetectStatus::Timeout,
		logfile,
	})
}

fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
	if !enabled {
		return ProgressBar::hidden();
	}
	let style =
		ProgressStyle::with_template("{wide_bar} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
			.unwrap_or_else(|_| ProgressStyle::default_bar());
	ProgressBar::new(len).with_style(style)
}

/// Runs one detector over one dataset against a pool of engine handles.
pub struct ExperimentRunner {
	handles: Vec<Arc<GraphEngineHandle>>,
	detector: Arc<dyn AttackDetector>,
	dataset: Vec<TxHash>,
	labels: AttackLabels,
}

impl ExperimentRunner {
	pub fn new(
		handles: Vec<GraphEngineHandle>,
		detector: Arc<dyn AttackDetector>,
		dataset: Vec<TxHash>,
		labels: AttackLabels,
	) -> Self {
		Self {
			handles: handles.into_iter().map(Arc::new).collect(),
			detector,
			dataset,
			labels,
		}
	}

	pub fn dataset_len(&self) -> usize {
		self.dataset.len()
	}

	/// Evaluates the dataset on the first handle, in dataset order.
	pub async fn run(&self, options: &RunOptions) -> Result<Vec<EvaluationRecord>, RunError> {
		let handle = self.handles.first().ok_or(RunError::NoHandles)?;
		let bar = progress_bar(self.dataset.len() as u64, options.show_progress);

		let mut records = Vec::with_capacity(self.dataset.len());
		for tx_hash in &self.dataset {
			let is_attack = self.labels.contains(tx_hash);
			let record =
				evaluate_one(handle, self.detector.as_ref(), tx_hash, is_attack, options).await?;
			records.push(record);
			bar.inc(1);
		}
		bar.finish_and_clear();
		Ok(records)
	}

	/// Evaluates the dataset with one worker per handle. Each worker owns
	/// its handle for the whole run; transactions are pulled from a shared
	/// queue, so record order follows completion, not dataset order.
	pub async fn run_parallel(
		&self,
		options: &RunOptions,
	) -> Result<Vec<EvaluationRecord>, RunError> {
		if self.handles.is_empty() {
			return Err(RunError::NoHandles);
		}

		let (task_tx, task_rx) = mpsc::unbounded_channel::<TxHash>();
		for tx_hash in &self.dataset {
			// Receiver outlives this loop, the send cannot fail.
			let _ = task_tx.send(tx_hash.clone());
		}
		drop(task_tx);
		let task_rx = Arc::new(Mutex::new(task_rx));
		let (result_tx, mut result_rx) = mpsc::unbounded_channel();

		let mut workers = Vec::with_capacity(self.handles.len());
		for handle in &self.handles {
			let handle = handle.clone();
			let detector = self.detector.clone();
			let labels = self.labels.clone();
			let options = options.clone();
			let task_rx = task_rx.clone();
			let result_tx = result_tx.clone();
			workers.push(tokio::spawn(async move {
				loop {
					let next = { task_rx.lock().await.recv().await };
					let Some(tx_hash) = next else { break };
					let is_attack = labels.contains(&tx_hash);
					let result =
						evaluate_one(&handle, detector.as_ref(), &tx_hash, is_attack, &options)
							.await;
					// A closed result channel means the collector gave up
					// on a fatal error; stop pulling work.
					if result_tx.send(result).is_err() {
						break;
					}
				}
			}));
		}
		drop(result_tx);

		let bar = progress_bar(self.dataset.len() as u64, options.show_progress);
		let mut records = Vec::with_capacity(self.dataset.len());
		while let Some(result) = result_rx.recv().await {
			records.push(result?);
			bar.inc(1);
		}
		bar.finish_and_clear();

		for worker in workers {
			worker.await.map_err(|e| RunError::Worker(e.to_string()))?;
		}
		Ok(records)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use epg_config::DetectionConfig;
	use epg_detect::ReentrancyDetector;
	use epg_engine::implementations::mock::{MockGraphClient, MockResponse, SharedMock};
	use serde_json::json;
	use std::path::Path;

	// Only the amount-dependency pattern walks dataflow:read.
	const AMOUNT: &str = "out('dataflow:read')";

	fn candidate() -> serde_json::Value {
		json!({
			"attacker": {"address": "0xa11ce"},
			"re_attacker": {"address": "0xa11ce"},
			"victim": {"address": "0xb0b"},
			"re_victim": {"address": "0xb0b"},
			"state_change": {"sourceType": "Storage"},
			"state_change_dcfg": {"dcfgId": "0-9-2"},
			"victim_flow": {"asset": "0xdead"},
			"victim_flow_dcfg": {"dcfgId": "0:1-4-0"},
		})
	}

	/// One handle over a fresh mock, importing graphs from `graph_dir`.
	fn mock_handle(graph_dir: &Path, builder: &str) -> (GraphEngineHandle, Arc<MockGraphClient>) {
		let mock = Arc::new(MockGraphClient::new());
		let handle = GraphEngineHandle::new(
			Box::new(SharedMock(mock.clone())),
			PathBuf::from(builder),
			graph_dir.to_path_buf(),
			"/exported-graphs".to_string(),
		);
		(handle, mock)
	}

	/// Seeds cache files for `txs` and arms the mock so the transactions
	/// in `attacks` produce a confirming reentrancy candidate.
	fn seed(graph_dir: &Path, mock: &MockGraphClient, txs: &[&str], attacks: &[&str]) {
		for tx in txs {
			std::fs::write(graph_dir.join(format!("{}.xml", tx)), "<graphml/>").unwrap();
		}
		for tx in attacks {
			mock.when_graph(tx, AMOUNT, MockResponse::Values(vec![candidate()]));
		}
	}

	fn detector() -> Arc<dyn AttackDetector> {
		Arc::new(ReentrancyDetector::new(&DetectionConfig::default()))
	}

	fn dataset(txs: &[&str]) -> Vec<TxHash> {
		txs.iter().map(|tx| tx.to_string()).collect()
	}

	fn options() -> RunOptions {
		let mut options = RunOptions::new(AttackKind::Reentrancy, Duration::from_secs(5));
		options.show_progress = false;
		options
	}

	#[tokio::test]
	async fn test_sequential_run_scores_all_outcomes() {
		let dir = tempfile::tempdir().unwrap();
		let (handle, mock) = mock_handle(dir.path(), "/bin/false");
		let txs = ["0xaaa", "0xbbb", "0xccc", "0xddd"];
		// 0xaaa: attack, detected. 0xbbb: benign. 0xccc: attack, missed.
		// 0xddd: benign, falsely detected.
		seed(dir.path(), &mock, &txs, &["0xaaa", "0xddd"]);
		let labels = AttackLabels::new(dataset(&["0xaaa", "0xccc"]));

		let runner = ExperimentRunner::new(vec![handle], detector(), dataset(&txs), labels);
		let records = runner.run(&options()).await.unwrap();

		assert_eq!(records.len(), 4);
		let verdicts: Vec<(String, bool, bool)> = records
			.iter()
			.map(|r| (r.tx_hash.clone(), r.is_attack, r.detect_attack))
			.collect();
		assert_eq!(
			verdicts,
			vec![
				("0xaaa".to_string(), true, true),
				("0xbbb".to_string(), false, false),
				("0xccc".to_string(), true, false),
				("0xddd".to_string(), false, true),
			]
		);

		let summary = Summary::from_records(&records);
		assert_eq!(summary.true_positives, 1);
		assert_eq!(summary.true_negatives, 1);
		assert_eq!(summary.false_positives, 1);
		assert_eq!(summary.false_negatives, 1);
		assert_eq!(summary.accuracy, Some(0.5));
	}

	#[tokio::test]
	async fn test_build_failure_yields_unmeasured_row() {
		let dir = tempfile::tempdir().unwrap();
		// No cache files, failing builder: every build fails.
		let (handle, _mock) = mock_handle(dir.path(), "/bin/false");
		let labels = AttackLabels::new(dataset(&["0xaaa"]));

		let runner =
			ExperimentRunner::new(vec![handle], detector(), dataset(&["0xaaa"]), labels);
		let records = runner.run(&options()).await.unwrap();

		assert_eq!(records.len(), 1);
		assert_eq!(records[0].traverse_time, None);
		assert!(!records[0].detect_attack);
		assert_eq!(Summary::from_records(&records).total, 0);
	}

	#[tokio::test]
	async fn test_detector_error_yields_unmeasured_row() {
		let dir = tempfile::tempdir().unwrap();
		let (handle, mock) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &mock, &["0xaaa", "0xbbb"], &["0xbbb"]);
		mock.when_graph("0xaaa", AMOUNT, MockResponse::Error("boom".to_string()));
		let labels = AttackLabels::new(dataset(&["0xbbb"]));

		let runner = ExperimentRunner::new(
			vec![handle],
			detector(),
			dataset(&["0xaaa", "0xbbb"]),
			labels,
		);
		let records = runner.run(&options()).await.unwrap();

		// The failing transaction is recorded and the run continues.
		assert_eq!(records[0].tx_hash, "0xaaa");
		assert_eq!(records[0].traverse_time, None);
		assert!(!records[0].detect_attack);
		assert!(records[1].detect_attack);
	}

	#[tokio::test]
	async fn test_detection_timeout_is_flagged() {
		let dir = tempfile::tempdir().unwrap();
		let (handle, mock) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &mock, &["0xaaa"], &[]);
		mock.when_graph("0xaaa", AMOUNT, MockResponse::Timeout);
		let labels = AttackLabels::new(dataset(&["0xaaa"]));

		let runner =
			ExperimentRunner::new(vec![handle], detector(), dataset(&["0xaaa"]), labels);
		let records = runner.run(&options()).await.unwrap();

		assert!(records[0].timed_out);
		assert_eq!(records[0].traverse_time, None);
		assert!(!records[0].detect_attack);
	}

	#[tokio::test]
	async fn test_drop_verification_failure_aborts_run() {
		let dir = tempfile::tempdir().unwrap();
		let (handle, mock) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &mock, &["0xaaa"], &[]);
		mock.when("g.V().count()", MockResponse::Values(vec![json!(7)]));
		let labels = AttackLabels::new(Vec::new());

		let runner =
			ExperimentRunner::new(vec![handle], detector(), dataset(&["0xaaa"]), labels);
		let err = runner.run(&options()).await.unwrap_err();
		assert!(matches!(err, RunError::Engine(EngineError::DropVerification(7))));
	}

	#[tokio::test]
	async fn test_logfile_paths_follow_attack_and_tx() {
		let dir = tempfile::tempdir().unwrap();
		let logs = tempfile::tempdir().unwrap();
		let (handle, mock) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &mock, &["0xaaa"], &["0xaaa"]);
		let labels = AttackLabels::new(dataset(&["0xaaa"]));

		let runner =
			ExperimentRunner::new(vec![handle], detector(), dataset(&["0xaaa"]), labels);
		let mut options = options();
		options.logfile_dir = Some(logs.path().to_path_buf());
		let records = runner.run(&options).await.unwrap();

		let expected = logs.path().join("reentrancy-0xaaa.log");
		assert_eq!(records[0].logfile.as_deref(), Some(expected.as_path()));
		assert!(expected.is_file());
	}

	#[tokio::test]
	async fn test_parallel_matches_sequential() {
		let dir = tempfile::tempdir().unwrap();
		let txs = ["0xaaa", "0xbbb", "0xccc", "0xddd", "0xeee", "0xfff"];
		let attacks = ["0xbbb", "0xeee"];

		let (seq_handle, seq_mock) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &seq_mock, &txs, &attacks);
		let (par_one, par_mock_one) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &par_mock_one, &[], &attacks);
		let (par_two, par_mock_two) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &par_mock_two, &[], &attacks);

		let labels = AttackLabels::new(dataset(&attacks));
		let sequential = ExperimentRunner::new(
			vec![seq_handle],
			detector(),
			dataset(&txs),
			labels.clone(),
		);
		let parallel = ExperimentRunner::new(
			vec![par_one, par_two],
			detector(),
			dataset(&txs),
			labels,
		);

		let mut seq_records = sequential.run(&options()).await.unwrap();
		let mut par_records = parallel.run_parallel(&options()).await.unwrap();
		seq_records.sort_by(|a, b| a.tx_hash.cmp(&b.tx_hash));
		par_records.sort_by(|a, b| a.tx_hash.cmp(&b.tx_hash));

		let strip = |records: &[EvaluationRecord]| {
			records
				.iter()
				.map(|r| (r.tx_hash.clone(), r.is_attack, r.detect_attack))
				.collect::<Vec<_>>()
		};
		assert_eq!(strip(&seq_records), strip(&par_records));
	}

	#[tokio::test]
	async fn test_parallel_splits_work_across_handles() {
		let dir = tempfile::tempdir().unwrap();
		let txs = ["0xaaa", "0xbbb", "0xccc", "0xddd"];
		let (one, mock_one) = mock_handle(dir.path(), "/bin/false");
		seed(dir.path(), &mock_one, &txs, &[]);
		let (two, mock_two) = mock_handle(dir.path(), "/bin/false");

		let runner = ExperimentRunner::new(
			vec![one, two],
			detector(),
			dataset(&txs),
			AttackLabels::new(Vec::new()),
		);
		let records = runner.run_parallel(&options()).await.unwrap();
		assert_eq!(records.len(), 4);

		// Every import went through exactly one of the two engines.
		let imports = |mock: &MockGraphClient| {
			mock.executed_scripts()
				.iter()
				.filter(|s| s.contains(".read()"))
				.count()
		};
		assert_eq!(imports(&mock_one) + imports(&mock_two), 4);
	}

	#[tokio::test]
	async fn test_runner_without_handles_is_an_error() {
		let runner = ExperimentRunner::new(
			Vec::new(),
			detector(),
			dataset(&["0xaaa"]),
			AttackLabels::new(Vec::new()),
		);
		assert!(matches!(
			runner.run(&options()).await,
			Err(RunError::NoHandles)
		));
		assert!(matches!(
			runner.run_parallel(&options()).await,
			Err(RunError::NoHandles)
		));
	}
}
