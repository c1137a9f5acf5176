//! Random subsets of records that drive the read, update and delete phases

use rand::seq::index;
use rand::Rng;
use serde::{ Deserialize, Serialize };

use crate::error::{ HarnessError, Result };
use crate::models::{ FieldValue, Record };

/// Values of `field` from `min(count, records.len())` distinct records,
/// chosen without replacement.
pub fn sample_values<T, R>(records: &[T], field: &str, count: usize, rng: &mut R) -> Result<Vec<FieldValue>>
	where T: Record, R: Rng + ?Sized
{
	if !T::FIELDS.contains(&field) {
		return Err(HarnessError::UnknownField {
			entity: T::ENTITY,
			field: field.to_string(),
		});
	}

	let amount = count.min(records.len());
	if amount == 0 {
		return Ok(Vec::new());
	}

	index
		::sample(rng, records.len(), amount)
		.into_iter()
		.map(|i| {
			records[i].field(field).ok_or_else(|| HarnessError::UnknownField {
				entity: T::ENTITY,
				field: field.to_string(),
			})
		})
		.collect()
}

/// How many records a phase touches relative to the dataset size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePolicy {
	pub fraction: f64,
	pub max: Option<usize>,
}

impl SamplePolicy {
	pub fn new(fraction: f64, max: Option<usize>) -> Self {
		SamplePolicy { fraction, max }
	}

	/// Half of the dataset, uncapped.
	pub fn half() -> Self {
		SamplePolicy::new(0.5, None)
	}

	/// 10% of the dataset, at most 1000.
	pub fn reads() -> Self {
		SamplePolicy::new(0.1, Some(1000))
	}

	pub fn updates() -> Self {
		SamplePolicy::reads()
	}

	/// 5% of the dataset, at most 500.
	pub fn deletes() -> Self {
		SamplePolicy::new(0.05, Some(500))
	}

	pub fn sample_size(&self, len: usize) -> usize {
		let scaled = ((len as f64) * self.fraction).floor() as usize;
		let scaled = scaled.min(len);
		match self.max {
			Some(max) => scaled.min(max),
			None => scaled,
		}
	}
}

/// Which sampling presets a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
	/// Half of every table for every phase.
	Half,
	/// 10% for reads and updates, 5% for deletes, each with a hard cap.
	Proportional,
}

impl SamplingMode {
	pub fn read_policy(&self) -> SamplePolicy {
		match self {
			SamplingMode::Half => SamplePolicy::half(),
			SamplingMode::Proportional => SamplePolicy::reads(),
		}
	}

	pub fn update_policy(&self) -> SamplePolicy {
		match self {
			SamplingMode::Half => SamplePolicy::half(),
			SamplingMode::Proportional => SamplePolicy::updates(),
		}
	}

	pub fn delete_policy(&self) -> SamplePolicy {
		match self {
			SamplingMode::Half => SamplePolicy::half(),
			SamplingMode::Proportional => SamplePolicy::deletes(),
		}
	}
}

impl std::str::FromStr for SamplingMode {
	type Err = HarnessError;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"half" => Ok(SamplingMode::Half),
			"proportional" => Ok(SamplingMode::Proportional),
			_ =>
				Err(HarnessError::InvalidConfig {
					key: "sampling".to_string(),
					value: s.to_string(),
				}),
		}
	}
}
