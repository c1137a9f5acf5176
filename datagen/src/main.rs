use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use common::{
	config::{ env_or, load_dotenv, DEFAULT_DATA_DIR },
	generator::{ generate_to_dir, DEFAULT_RECORD_COUNT },
	init_tracing,
};
use tracing::error;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate the e-commerce CSV dataset")]
struct Args {
	/// Records per base category (users, products, orders, reviews)
	#[arg(short, long, default_value_t = DEFAULT_RECORD_COUNT)]
	count: usize,

	/// Directory the CSV files are written to [default: $BENCH_DATA_DIR or "data"]
	#[arg(short, long)]
	data_dir: Option<PathBuf>,
}

/// The flag wins; otherwise the same `BENCH_DATA_DIR` the benchmarks read.
fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
	match flag {
		Some(dir) => Ok(dir),
		None => Ok(env_or("BENCH_DATA_DIR", PathBuf::from(DEFAULT_DATA_DIR))?),
	}
}

fn main() -> Result<()> {
	init_tracing();
	load_dotenv();
	let args = Args::parse();
	let data_dir = resolve_data_dir(args.data_dir)?;

	if let Err(e) = generate_to_dir(args.count, &data_dir) {
		error!("Generation into {} failed: {}", data_dir.display(), e);
		return Err(e.into());
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_data_dir_wins() {
		let args = Args::try_parse_from(["datagen", "--count", "5", "--data-dir", "/tmp/shop"]).unwrap();
		assert_eq!(args.count, 5);
		assert_eq!(resolve_data_dir(args.data_dir).unwrap(), PathBuf::from("/tmp/shop"));
	}

	#[test]
	fn data_dir_defaults_to_the_benchmark_setting() {
		let args = Args::try_parse_from(["datagen"]).unwrap();
		assert_eq!(args.count, DEFAULT_RECORD_COUNT);
		let expected = env_or("BENCH_DATA_DIR", PathBuf::from(DEFAULT_DATA_DIR)).unwrap();
		assert_eq!(resolve_data_dir(args.data_dir).unwrap(), expected);
	}
}
