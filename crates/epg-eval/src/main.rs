//! Command-line entry point for the attack evaluation harness.
//!
//! One subcommand per attack kind. A run resolves the dataset and its
//! ground-truth labels, binds one engine handle per configured endpoint,
//! evaluates every transaction (optionally in parallel) for the requested
//! number of repeats, logs a summary per repeat and writes one CSV with
//! all rows.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use epg_config::Config;
use epg_dataset::{difference, load_tx_file, AttackLabels};
use epg_detect::{AttackDetector, OracleManipulationDetector, ReentrancyDetector};
use epg_engine::{implementations::http::create_http_client, GraphEngineHandle};
use epg_runner::{write_csv, ExperimentRunner, RunOptions, Summary};
use epg_types::{AttackKind, EvaluationRecord, TxHash};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder deadline for oracle runs. Oracle-manipulation transactions
/// carry far more asset flows than the configured default anticipates.
const ORACLE_BUILD_TIMEOUT_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(author, version, about = "Attack detection evaluation harness", long_about = None)]
struct Cli {
	/// Path to configuration file
	#[arg(long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Evaluate the reentrancy detector
	Reentrancy(RunArgs),
	/// Evaluate the oracle-manipulation detector
	Oracle(RunArgs),
	/// Prefetch raw execution traces into the on-disk trace cache
	Prefetch(PrefetchArgs),
}

#[derive(Args, Debug)]
struct PrefetchArgs {
	/// Dataset file listing the transactions to prefetch
	#[arg(short = 'f', long)]
	dataset_file: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
	/// Dataset to evaluate
	#[arg(short, long, value_enum, default_value = "attack")]
	dataset: DatasetChoice,

	/// Dataset file, required with `--dataset file`
	#[arg(short = 'f', long)]
	dataset_file: Option<PathBuf>,

	/// Output CSV file
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Directory for per-transaction candidate log files
	#[arg(short, long)]
	logfile_dir: Option<PathBuf>,

	/// Cache subdirectory under the exported-graph directory
	#[arg(short, long)]
	cache_dir: Option<String>,

	/// Number of experiment repeats
	#[arg(short = 'n', long, default_value_t = 1)]
	repeat_times: usize,

	/// Disable the progress bar
	#[arg(short = 'q', long)]
	no_progress: bool,

	/// Run one worker per configured engine endpoint
	#[arg(short, long)]
	parallel: bool,

	/// Label every transaction in the dataset as an attack
	#[arg(short = 'a', long)]
	is_attack: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DatasetChoice {
	/// The labeled attack transactions for this attack kind
	Attack,
	/// Background transactions, labeled attacks removed
	Random,
	/// An explicit transaction list file
	File,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
	fmt().with_env_filter(env_filter).with_target(true).init();

	let config = Config::from_file_async(&cli.config)
		.await
		.with_context(|| format!("loading configuration from {}", cli.config.display()))?;

	match &cli.command {
		Command::Reentrancy(args) => run(AttackKind::Reentrancy, args, &config).await,
		Command::Oracle(args) => run(AttackKind::OracleManipulation, args, &config).await,
		Command::Prefetch(args) => prefetch(args, &config).await,
	}
}

async fn prefetch(args: &PrefetchArgs, config: &Config) -> anyhow::Result<()> {
	let Some(trace_config) = &config.trace else {
		bail!("prefetch requires a [trace] section in the configuration");
	};
	let client = epg_engine::TraceClient::new(trace_config);
	let txs = load_tx_file(&args.dataset_file)?;
	tracing::info!(transactions = txs.len(), "prefetching traces");

	let mut failed = 0usize;
	for tx_hash in &txs {
		if let Err(e) = client.get_trace(tx_hash).await {
			tracing::warn!(tx_hash, error = %e, "trace fetch failed");
			failed += 1;
		}
	}
	if failed > 0 {
		bail!("{} of {} traces could not be fetched", failed, txs.len());
	}
	Ok(())
}

fn resolve_dataset(
	attack: AttackKind,
	args: &RunArgs,
	config: &Config,
) -> anyhow::Result<(Vec<TxHash>, AttackLabels)> {
	let attack_file = match attack {
		AttackKind::Reentrancy => &config.datasets.reentrancy,
		AttackKind::OracleManipulation => &config.datasets.oracle,
	};
	let attack_txs = load_tx_file(attack_file)?;

	let dataset = match args.dataset {
		DatasetChoice::Attack => attack_txs.clone(),
		DatasetChoice::Random => {
			let background = load_tx_file(&config.datasets.random)?;
			difference(&background, &attack_txs)
		}
		DatasetChoice::File => {
			let Some(path) = &args.dataset_file else {
				bail!("--dataset file requires --dataset-file");
			};
			load_tx_file(path)?
		}
	};

	let labels = if args.is_attack {
		AttackLabels::new(dataset.iter().cloned())
	} else {
		AttackLabels::new(attack_txs)
	};
	Ok((dataset, labels))
}

async fn run(attack: AttackKind, args: &RunArgs, config: &Config) -> anyhow::Result<()> {
	let (dataset, labels) = resolve_dataset(attack, args, config)?;
	tracing::info!(
		%attack,
		transactions = dataset.len(),
		labeled_attacks = labels.len(),
		"dataset resolved"
	);

	let detector: Arc<dyn AttackDetector> = match attack {
		AttackKind::Reentrancy => Arc::new(ReentrancyDetector::new(&config.detection)),
		AttackKind::OracleManipulation => {
			Arc::new(OracleManipulationDetector::new(&config.detection))
		}
	};

	let handles: Vec<GraphEngineHandle> = config
		.engine
		.endpoints
		.iter()
		.map(|endpoint| GraphEngineHandle::for_endpoint(&config.engine, create_http_client(endpoint)))
		.collect();

	if let Some(dir) = &args.logfile_dir {
		tokio::fs::create_dir_all(dir)
			.await
			.with_context(|| format!("creating log directory {}", dir.display()))?;
	}

	let build_timeout_secs = match attack {
		AttackKind::Reentrancy => config.engine.build_timeout_secs,
		AttackKind::OracleManipulation => ORACLE_BUILD_TIMEOUT_SECS,
	};
	let mut options = RunOptions::new(attack, Duration::from_secs(build_timeout_secs));
	options.cache_dir = args.cache_dir.clone();
	options.logfile_dir = args.logfile_dir.clone();
	options.show_progress = !args.no_progress;

	let runner = ExperimentRunner::new(handles, detector, dataset, labels);

	let mut rows: Vec<(EvaluationRecord, usize)> = Vec::new();
	for exp_id in 0..args.repeat_times {
		tracing::info!(exp_id, "experiment start");
		let records = if args.parallel {
			runner.run_parallel(&options).await?
		} else {
			runner.run(&options).await?
		};
		Summary::from_records(&records).log();
		rows.extend(records.into_iter().map(|record| (record, exp_id)));
	}

	let output = args
		.output
		.clone()
		.unwrap_or_else(|| PathBuf::from(format!("/tmp/res_{}.csv", attack)));
	write_csv(&output, &rows).await?;
	tracing::info!(output = %output.display(), rows = rows.len(), "results saved");
	Ok(())
}
