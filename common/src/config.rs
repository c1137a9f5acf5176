//! Harness configuration
//!
//! Defaults are plain constants. Any of them can be overridden through the
//! environment, and a `.env` file in the working directory is loaded first.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::benchmark::DriverSettings;
use crate::error::{ HarnessError, Result };
use crate::sampler::SamplingMode;
use crate::timing::FailurePolicy;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_RESULTS_DIR: &str = "results";

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
	pub data_dir: PathBuf,
	pub results_dir: PathBuf,
	/// Put result files under `records_<n>` for the detected dataset size.
	pub partition_results: bool,
	/// Truncate the result file at start instead of appending to it.
	pub reset_results: bool,
	pub on_failure: FailurePolicy,
	pub sampling: SamplingMode,
	pub run_analytical: bool,
}

impl Default for HarnessConfig {
	fn default() -> Self {
		HarnessConfig {
			data_dir: PathBuf::from(DEFAULT_DATA_DIR),
			results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
			partition_results: true,
			reset_results: false,
			on_failure: FailurePolicy::RecordZero,
			sampling: SamplingMode::Proportional,
			run_analytical: true,
		}
	}
}

impl HarnessConfig {
	pub fn from_env() -> Result<Self> {
		load_dotenv();
		let defaults = HarnessConfig::default();

		Ok(HarnessConfig {
			data_dir: env_or("BENCH_DATA_DIR", defaults.data_dir)?,
			results_dir: env_or("BENCH_RESULTS_DIR", defaults.results_dir)?,
			partition_results: env_flag("BENCH_PARTITION_RESULTS", defaults.partition_results)?,
			reset_results: env_flag("BENCH_RESET_RESULTS", defaults.reset_results)?,
			on_failure: env_or("BENCH_ON_FAILURE", defaults.on_failure)?,
			sampling: env_or("BENCH_SAMPLING", defaults.sampling)?,
			run_analytical: env_flag("BENCH_ANALYTICAL", defaults.run_analytical)?,
		})
	}

	pub fn driver_settings(&self) -> DriverSettings {
		DriverSettings {
			on_failure: self.on_failure,
			read: self.sampling.read_policy(),
			update: self.sampling.update_policy(),
			delete: self.sampling.delete_policy(),
			run_analytical: self.run_analytical,
		}
	}
}

/// Load `.env` if present; a missing file is not an error.
pub fn load_dotenv() {
	match dotenvy::dotenv() {
		Ok(path) => debug!("Loaded environment from {}", path.display()),
		Err(e) if e.not_found() => {}
		Err(e) => debug!("Ignoring unreadable .env file: {}", e),
	}
}

/// Parse `key` from the environment, falling back to `default` when unset.
pub fn env_or<T>(key: &str, default: T) -> Result<T> where T: FromStr {
	match env::var(key) {
		Ok(value) =>
			value.parse::<T>().map_err(|_| HarnessError::InvalidConfig {
				key: key.to_string(),
				value,
			}),
		Err(_) => Ok(default),
	}
}

/// Boolean variables accept 1/0, true/false, yes/no and on/off.
pub fn env_flag(key: &str, default: bool) -> Result<bool> {
	match env::var(key) {
		Ok(value) =>
			match value.trim().to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => Ok(true),
				"0" | "false" | "no" | "off" => Ok(false),
				_ =>
					Err(HarnessError::InvalidConfig {
						key: key.to_string(),
						value,
					}),
			}
		Err(_) => Ok(default),
	}
}
