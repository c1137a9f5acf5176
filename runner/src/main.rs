use std::env;
use std::path::{ Path, PathBuf };

use anyhow::{ bail, Context, Result };
use async_trait::async_trait;
use common::{
	config::{ env_or, load_dotenv, HarnessConfig },
	init_tracing,
	runner::{ run_scale_loop, LoopConfig, ScaleWorkload, StopReason },
};
use tokio::process::Command;
use tracing::info;

const DEFAULT_TARGETS: &str = "benchmarks-mysql,benchmarks-mongodb";
const DATAGEN_BINARY: &str = "datagen";

/// Runs the sibling binaries built into the same target directory.
struct ProcessWorkload {
	bin_dir: PathBuf,
	/// Where `datagen` writes; the targets read `BENCH_DATA_DIR` from the same config.
	data_dir: PathBuf,
}

impl ProcessWorkload {
	fn from_current_exe(data_dir: PathBuf) -> Result<Self> {
		let exe = env::current_exe().context("cannot locate the runner binary")?;
		let bin_dir = exe.parent().map(Path::to_path_buf).context("runner binary has no parent directory")?;
		Ok(Self { bin_dir, data_dir })
	}

	async fn run(&self, binary: &str, args: &[String]) -> Result<()> {
		let path = self.bin_dir.join(binary);
		let status = Command::new(&path)
			.args(args)
			.status().await
			.with_context(|| format!("failed to start {}", path.display()))?;
		if !status.success() {
			bail!("{} exited with {}", binary, status);
		}
		Ok(())
	}
}

#[async_trait]
impl ScaleWorkload for ProcessWorkload {
	async fn generate(&mut self, count: usize) -> Result<()> {
		self.run(DATAGEN_BINARY, &datagen_args(count, &self.data_dir)).await
	}

	async fn run_target(&mut self, target: &str, count: usize) -> Result<()> {
		info!("Running {} against {} records", target, count);
		self.run(target, &[]).await
	}
}

fn datagen_args(count: usize, data_dir: &Path) -> Vec<String> {
	vec![
		"--count".to_string(),
		count.to_string(),
		"--data-dir".to_string(),
		data_dir.display().to_string()
	]
}

fn parse_targets(list: &str) -> Vec<String> {
	list.split(',')
		.map(str::trim)
		.filter(|target| !target.is_empty())
		.map(String::from)
		.collect()
}

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	load_dotenv();

	let targets = parse_targets(&env_or("RUNNER_TARGETS", DEFAULT_TARGETS.to_string())?);
	let config = LoopConfig::new(targets).with_env_overrides()?;
	info!(
		"Scaling from {} records by {} until a target takes {}s",
		config.start_count,
		config.step,
		config.ceiling.as_secs()
	);

	let data_dir = HarnessConfig::from_env()?.data_dir;
	let mut workload = ProcessWorkload::from_current_exe(data_dir)?;
	let summary = run_scale_loop(&config, &mut workload).await;
	info!("Summary: {}", serde_json::to_string_pretty(&summary)?);

	if let StopReason::GenerationFailed { message } = summary.stop_reason {
		bail!("data generation failed: {}", message);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn targets_are_comma_separated() {
		assert_eq!(parse_targets(DEFAULT_TARGETS), vec!["benchmarks-mysql", "benchmarks-mongodb"]);
		assert_eq!(parse_targets(" mysql , ,mongodb "), vec!["mysql", "mongodb"]);
		assert!(parse_targets("").is_empty());
	}

	#[test]
	fn datagen_writes_where_the_targets_read() {
		let args = datagen_args(120_000, Path::new("/srv/shop-data"));
		assert_eq!(args, vec!["--count", "120000", "--data-dir", "/srv/shop-data"]);
	}
}
