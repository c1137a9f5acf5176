//! Error types for the benchmark harness
//!
//! Library code returns `HarnessError`; binaries and database targets wrap it
//! in `anyhow::Error` at their edges.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Entity;

#[derive(Error, Debug)]
pub enum HarnessError {
	#[error("{entity} has no field named `{field}`")]
	UnknownField {
		entity: Entity,
		field: String,
	},

	#[error("{entity} record is missing field `{field}`")]
	MissingField {
		entity: Entity,
		field: String,
	},

	#[error("cannot coerce {entity}.{field} value {value:?}: {reason}")]
	Coercion {
		entity: Entity,
		field: String,
		value: String,
		reason: String,
	},

	#[error("unknown entity `{0}`")]
	UnknownEntity(String),

	#[error("invalid value {value:?} for {key}")]
	InvalidConfig {
		key: String,
		value: String,
	},

	#[error("failed to access {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("csv error in {path}: {source}")]
	Csv {
		path: PathBuf,
		#[source]
		source: csv::Error,
	},
}

impl HarnessError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		HarnessError::Io { path: path.into(), source }
	}

	pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
		HarnessError::Csv { path: path.into(), source }
	}
}

pub type Result<T> = std::result::Result<T, HarnessError>;
