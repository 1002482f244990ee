//! CSV result reports.
//!
//! One row per evaluated transaction per repeat. A `traverse_time` cell is
//! the measured query time, the marker `Timeout` when detection hit the
//! engine's evaluation deadline, or empty when the graph never got built;
//! downstream analysis filters non-numeric cells the same way the scorer
//! does.

use epg_types::EvaluationRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write report {path}: {source}")]
pub struct ReportError {
	pub path: PathBuf,
	#[source]
	pub source: std::io::Error,
}

const HEADER: &str = "tx_hash,traverse_time,is_attack,detect_attack,logfile,exp_id";

/// Renders `(record, repeat id)` rows as CSV text.
pub fn render_csv(rows: &[(EvaluationRecord, usize)]) -> String {
	let mut out = String::from(HEADER);
	out.push('\n');
	for (record, exp_id) in rows {
		let traverse_time = if record.timed_out {
			"Timeout".to_string()
		} else {
			record
				.traverse_time
				.map(|t| t.to_string())
				.unwrap_or_default()
		};
		let logfile = record
			.logfile
			.as_ref()
			.map(|p| p.display().to_string())
			.unwrap_or_default();
		out.push_str(&format!(
			"{},{},{},{},{},{}\n",
			record.tx_hash, traverse_time, record.is_attack, record.detect_attack, logfile, exp_id
		));
	}
	out
}

pub async fn write_csv(
	path: impl AsRef<Path>,
	rows: &[(EvaluationRecord, usize)],
) -> Result<(), ReportError> {
	let path = path.as_ref();
	tokio::fs::write(path, render_csv(rows))
		.await
		.map_err(|e| ReportError {
			path: path.to_path_buf(),
			source: e,
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(tx: &str, traverse_time: Option<f64>) -> EvaluationRecord {
		EvaluationRecord {
			tx_hash: tx.to_string(),
			traverse_time,
			is_attack: true,
			detect_attack: traverse_time.is_some(),
			timed_out: false,
			logfile: None,
		}
	}

	#[test]
	fn test_render_rows_and_header() {
		let rows = vec![
			(record("0xaaa", Some(1.25)), 0),
			(record("0xbbb", None), 1),
		];
		let csv = render_csv(&rows);
		let lines: Vec<&str> = csv.lines().collect();
		assert_eq!(lines[0], HEADER);
		assert_eq!(lines[1], "0xaaa,1.25,true,true,,0");
		assert_eq!(lines[2], "0xbbb,,true,false,,1");
	}

	#[test]
	fn test_detection_timeout_cell_keeps_its_marker() {
		let mut timeout_row = record("0xeee", None);
		timeout_row.timed_out = true;
		let rows = vec![(timeout_row, 0), (record("0xfff", None), 0)];
		let csv = render_csv(&rows);
		let lines: Vec<&str> = csv.lines().collect();
		assert_eq!(lines[1], "0xeee,Timeout,true,false,,0");
		// A build failure stays distinguishable as an empty cell.
		assert_eq!(lines[2], "0xfff,,true,false,,0");
	}

	#[test]
	fn test_logfile_cell() {
		let mut row = record("0xccc", Some(0.5));
		row.logfile = Some(PathBuf::from("/tmp/logs/reentrancy-0xccc.log"));
		let csv = render_csv(&[(row, 2)]);
		assert!(csv.ends_with("0xccc,0.5,true,true,/tmp/logs/reentrancy-0xccc.log,2\n"));
	}

	#[tokio::test]
	async fn test_write_csv() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("results.csv");
		write_csv(&path, &[(record("0xddd", Some(2.0)), 0)])
			.await
			.unwrap();
		let body = std::fs::read_to_string(&path).unwrap();
		assert!(body.starts_with(HEADER));
		assert!(body.contains("0xddd"));
	}
}
