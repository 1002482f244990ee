//! Scoring for one experiment run.

use epg_types::EvaluationRecord;
use std::fmt;

fn metric(value: Option<f64>) -> String {
	match value {
		Some(v) => format!("{:.6}", v),
		None => "n/a".to_string(),
	}
}

/// Confusion matrix and timing statistics over one run's records.
///
/// Rows without a measured traverse time (the build or the detection did
/// not complete) are excluded from every statistic. Undefined ratios stay
/// `None` instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
	pub total: usize,
	pub true_positives: usize,
	pub true_negatives: usize,
	pub false_positives: usize,
	pub false_negatives: usize,
	pub accuracy: Option<f64>,
	pub precision: Option<f64>,
	pub recall: Option<f64>,
	pub f1_score: Option<f64>,
	pub time_mean: Option<f64>,
	pub time_std: Option<f64>,
	pub time_max: Option<f64>,
	pub time_min: Option<f64>,
}

impl Summary {
	pub fn from_records(records: &[EvaluationRecord]) -> Self {
		let measured: Vec<&EvaluationRecord> = records
			.iter()
			.filter(|r| r.traverse_time.is_some())
			.collect();

		let count = |is_attack: bool, detected: bool| {
			measured
				.iter()
				.filter(|r| r.is_attack == is_attack && r.detect_attack == detected)
				.count()
		};
		let true_positives = count(true, true);
		let true_negatives = count(false, false);
		let false_positives = count(false, true);
		let false_negatives = count(true, false);
		let total = measured.len();

		let ratio = |num: usize, den: usize| (den > 0).then(|| num as f64 / den as f64);
		let accuracy = ratio(true_positives + true_negatives, total);
		let precision = ratio(true_positives, true_positives + false_positives);
		let recall = ratio(true_positives, true_positives + false_negatives);
		let f1_score = match (precision, recall) {
			(Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
			_ => None,
		};

		let times: Vec<f64> = measured.iter().filter_map(|r| r.traverse_time).collect();
		let time_mean = (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);
		// Sample standard deviation, undefined below two measurements.
		let time_std = match (times.len(), time_mean) {
			(n, Some(mean)) if n >= 2 => {
				let variance =
					times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
				Some(variance.sqrt())
			}
			_ => None,
		};
		let time_max = times.iter().copied().reduce(f64::max);
		let time_min = times.iter().copied().reduce(f64::min);

		Self {
			total,
			true_positives,
			true_negatives,
			false_positives,
			false_negatives,
			accuracy,
			precision,
			recall,
			f1_score,
			time_mean,
			time_std,
			time_max,
			time_min,
		}
	}

	pub fn log(&self) {
		tracing::info!(
			total = self.total,
			tp = self.true_positives,
			tn = self.true_negatives,
			fp = self.false_positives,
			fn_ = self.false_negatives,
			"confusion matrix"
		);
		tracing::info!(
			accuracy = %metric(self.accuracy),
			precision = %metric(self.precision),
			recall = %metric(self.recall),
			f1_score = %metric(self.f1_score),
			"scores"
		);
		tracing::info!(
			mean = %metric(self.time_mean),
			std = %metric(self.time_std),
			max = %metric(self.time_max),
			min = %metric(self.time_min),
			"traverse time (s)"
		);
	}
}

impl fmt::Display for Summary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"total: {}, TP: {}, TN: {}, FP: {}, FN: {}",
			self.total,
			self.true_positives,
			self.true_negatives,
			self.false_positives,
			self.false_negatives
		)?;
		writeln!(
			f,
			"accuracy: {}, precision: {}, recall: {}, F1 score: {}",
			metric(self.accuracy),
			metric(self.precision),
			metric(self.recall),
			metric(self.f1_score)
		)?;
		write!(
			f,
			"traverse time: {} ± {}s, max: {}s, min: {}s",
			metric(self.time_mean),
			metric(self.time_std),
			metric(self.time_max),
			metric(self.time_min)
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(
		tx: &str,
		traverse_time: Option<f64>,
		is_attack: bool,
		detect_attack: bool,
	) -> EvaluationRecord {
		EvaluationRecord {
			tx_hash: tx.to_string(),
			traverse_time,
			is_attack,
			detect_attack,
			timed_out: false,
			logfile: None,
		}
	}

	#[test]
	fn test_confusion_matrix() {
		let records = vec![
			record("0xa", Some(1.0), true, true),
			record("0xb", Some(2.0), false, false),
			record("0xc", Some(3.0), true, false),
			record("0xd", Some(4.0), false, true),
		];
		let summary = Summary::from_records(&records);
		assert_eq!(summary.total, 4);
		assert_eq!(summary.true_positives, 1);
		assert_eq!(summary.true_negatives, 1);
		assert_eq!(summary.false_positives, 1);
		assert_eq!(summary.false_negatives, 1);
		assert_eq!(summary.accuracy, Some(0.5));
		assert_eq!(summary.precision, Some(0.5));
		assert_eq!(summary.recall, Some(0.5));
		assert_eq!(summary.f1_score, Some(0.5));
	}

	#[test]
	fn test_unmeasured_rows_are_excluded() {
		let records = vec![
			record("0xa", Some(1.0), true, true),
			record("0xb", None, true, false),
			record("0xc", None, false, false),
		];
		let summary = Summary::from_records(&records);
		assert_eq!(summary.total, 1);
		assert_eq!(summary.true_positives, 1);
		assert_eq!(summary.false_negatives, 0);
		assert_eq!(summary.accuracy, Some(1.0));
	}

	#[test]
	fn test_undefined_ratios_stay_none() {
		// All negatives, nothing detected: precision and recall have zero
		// denominators.
		let records = vec![
			record("0xa", Some(1.0), false, false),
			record("0xb", Some(2.0), false, false),
		];
		let summary = Summary::from_records(&records);
		assert_eq!(summary.precision, None);
		assert_eq!(summary.recall, None);
		assert_eq!(summary.f1_score, None);
		assert_eq!(summary.accuracy, Some(1.0));
	}

	#[test]
	fn test_empty_run() {
		let summary = Summary::from_records(&[]);
		assert_eq!(summary.total, 0);
		assert_eq!(summary.accuracy, None);
		assert_eq!(summary.time_mean, None);
		assert_eq!(summary.time_std, None);
	}

	#[test]
	fn test_timing_statistics() {
		let records = vec![
			record("0xa", Some(1.0), false, false),
			record("0xb", Some(3.0), false, false),
		];
		let summary = Summary::from_records(&records);
		assert_eq!(summary.time_mean, Some(2.0));
		// Sample std of [1, 3] is sqrt(2).
		assert!((summary.time_std.unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
		assert_eq!(summary.time_max, Some(3.0));
		assert_eq!(summary.time_min, Some(1.0));
	}

	#[test]
	fn test_single_measurement_has_no_std() {
		let records = vec![record("0xa", Some(1.5), false, false)];
		let summary = Summary::from_records(&records);
		assert_eq!(summary.time_mean, Some(1.5));
		assert_eq!(summary.time_std, None);
	}

	#[test]
	fn test_display_is_readable() {
		let summary = Summary::from_records(&[record("0xa", Some(1.0), true, true)]);
		let text = summary.to_string();
		assert!(text.contains("TP: 1"));
		assert!(text.contains("accuracy: 1.000000"));
	}
}
