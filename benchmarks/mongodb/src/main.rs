use std::sync::Arc;

use anyhow::Result;
mod mongodb_benchmark;

use crate::mongodb_benchmark::{ MongoBenchmark, MongoSettings };
use common::{ benchmark::run_benchmark, config::HarnessConfig, init_tracing };
use tracing::{ error, info };

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	info!("Starting MongoDB benchmark");

	let config = HarnessConfig::from_env()?;
	let settings = MongoSettings::from_env()?;

	let benchmark = match MongoBenchmark::connect(&settings).await {
		Ok(benchmark) => benchmark,
		Err(e) => {
			error!("Could not connect to MongoDB database {}: {:#}", settings.database, e);
			return Err(e);
		}
	};

	let report = run_benchmark(Arc::new(benchmark), &config).await?;
	info!("Report: {}", serde_json::to_string_pretty(&report)?);

	Ok(())
}
