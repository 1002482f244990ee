//! Transaction dataset loading for the evaluation harness.
//!
//! Datasets are plain-text files with one transaction hash per line. Loaded
//! lists are always deduplicated and sorted so that runs over the same
//! inputs visit transactions in a deterministic order.

use epg_types::TxHash;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading dataset files.
#[derive(Debug, Error)]
pub enum DatasetError {
	#[error("failed to read dataset file {0}: {1}")]
	Io(String, #[source] std::io::Error),
}

/// Loads a transaction-hash list file.
///
/// Lines are trimmed, blank lines skipped, duplicates removed and the
/// result sorted.
pub fn load_tx_file(path: impl AsRef<Path>) -> Result<Vec<TxHash>, DatasetError> {
	let path = path.as_ref();
	let content = std::fs::read_to_string(path)
		.map_err(|e| DatasetError::Io(path.display().to_string(), e))?;

	let unique: HashSet<TxHash> = content
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.map(str::to_string)
		.collect();

	let mut txs: Vec<TxHash> = unique.into_iter().collect();
	txs.sort();
	Ok(txs)
}

/// Sorted set difference: every hash in `dataset` that is not in `exclude`.
///
/// Used to strip labeled attack transactions out of a background dataset.
pub fn difference(dataset: &[TxHash], exclude: &[TxHash]) -> Vec<TxHash> {
	let excluded: HashSet<&TxHash> = exclude.iter().collect();
	let mut remaining: Vec<TxHash> = dataset
		.iter()
		.filter(|tx| !excluded.contains(tx))
		.cloned()
		.collect();
	remaining.sort();
	remaining
}

/// Ground-truth positive transactions for one attack kind.
///
/// Labels feed scoring only; the detectors never see them.
#[derive(Debug, Clone)]
pub struct AttackLabels {
	labels: HashSet<TxHash>,
}

impl AttackLabels {
	pub fn new(txs: impl IntoIterator<Item = TxHash>) -> Self {
		Self {
			labels: txs.into_iter().collect(),
		}
	}

	pub fn contains(&self, tx: &str) -> bool {
		self.labels.contains(tx)
	}

	pub fn len(&self) -> usize {
		self.labels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.labels.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn write_file(content: &str) -> NamedTempFile {
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[test]
	fn test_load_dedups_and_sorts() {
		let file = write_file("0xccc\n\n0xaaa\n0xccc\n  0xbbb  \n");
		let txs = load_tx_file(file.path()).unwrap();
		assert_eq!(txs, vec!["0xaaa", "0xbbb", "0xccc"]);
	}

	#[test]
	fn test_load_is_idempotent() {
		let file = write_file("0xb\n0xa\n0xb\n");
		let txs = load_tx_file(file.path()).unwrap();
		let mut again: Vec<TxHash> = txs.iter().cloned().collect::<HashSet<_>>().into_iter().collect();
		again.sort();
		assert_eq!(txs, again);
	}

	#[test]
	fn test_load_missing_file() {
		assert!(load_tx_file("/nonexistent/dataset.txt").is_err());
	}

	#[test]
	fn test_difference() {
		let dataset = vec!["0xa".to_string(), "0xb".to_string(), "0xc".to_string()];
		let exclude = vec!["0xb".to_string(), "0xd".to_string()];
		assert_eq!(difference(&dataset, &exclude), vec!["0xa", "0xc"]);
	}

	#[test]
	fn test_attack_labels() {
		let labels = AttackLabels::new(vec!["0xa".to_string(), "0xb".to_string()]);
		assert!(labels.contains("0xa"));
		assert!(!labels.contains("0xc"));
		assert_eq!(labels.len(), 2);
	}
}
