use std::sync::Arc;

use anyhow::Result;
mod mysql_benchmark;

use crate::mysql_benchmark::{ MysqlBenchmark, MysqlSettings };
use common::{ benchmark::run_benchmark, config::HarnessConfig, init_tracing };
use tracing::{ error, info };

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	info!("Starting MySQL benchmark");

	let config = HarnessConfig::from_env()?;
	let settings = MysqlSettings::from_env()?;

	let benchmark = match MysqlBenchmark::connect(&settings).await {
		Ok(benchmark) => benchmark,
		Err(e) => {
			error!("Could not connect to MySQL at {}:{}: {:#}", settings.host, settings.port, e);
			return Err(e);
		}
	};

	let report = run_benchmark(Arc::new(benchmark), &config).await?;
	info!("Report: {}", serde_json::to_string_pretty(&report)?);

	Ok(())
}
