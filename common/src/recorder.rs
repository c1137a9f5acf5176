//! Append-only result files
//!
//! One CSV file per database, one row per measurement. The header is written
//! when the file is created and never again.

use std::fs::{ self, File, OpenOptions };
use std::io::{ BufRead, BufReader };
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };
use tracing::debug;

use crate::error::{ HarnessError, Result };
use crate::models::Entity;

pub const RESULT_HEADER: [&str; 6] = [
	"operation",
	"database",
	"entity",
	"total_time",
	"avg_time",
	"record_count",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
	pub operation: String,
	pub database: String,
	pub entity: String,
	/// Seconds, rounded to 4 decimals.
	pub total_time: f64,
	/// Seconds per record, rounded to 6 decimals; zero when nothing was counted.
	pub avg_time: f64,
	pub record_count: usize,
}

impl ResultRow {
	pub fn new(operation: &str, database: &str, entity: &str, total: Duration, count: usize) -> Self {
		let total_secs = total.as_secs_f64();
		let avg_secs = if count > 0 { total_secs / (count as f64) } else { 0.0 };

		ResultRow {
			operation: operation.to_string(),
			database: database.to_string(),
			entity: entity.to_string(),
			total_time: round_to(total_secs, 4),
			avg_time: round_to(avg_secs, 6),
			record_count: count,
		}
	}
}

fn round_to(value: f64, decimals: i32) -> f64 {
	let factor = (10f64).powi(decimals);
	(value * factor).round() / factor
}

/// Where a run's result files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPartition {
	/// Directly under the results root.
	Flat,
	/// Under `records_<n>`, keeping dataset sizes apart.
	ByRecordCount(usize),
}

/// Resolve (and create) the directory for `partition` under `root`.
pub fn results_dir_for(root: &Path, partition: ResultPartition) -> Result<PathBuf> {
	let dir = match partition {
		ResultPartition::Flat => root.to_path_buf(),
		ResultPartition::ByRecordCount(count) => root.join(format!("records_{}", count)),
	};
	fs::create_dir_all(&dir).map_err(|e| HarnessError::io(&dir, e))?;
	Ok(dir)
}

/// Lines in `users.csv` minus its header; zero when the file is missing.
pub fn detect_record_count(data_dir: &Path) -> Result<usize> {
	let path = data_dir.join(Entity::Users.file_name());
	let file = match File::open(&path) {
		Ok(file) => file,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			return Ok(0);
		}
		Err(e) => {
			return Err(HarnessError::io(&path, e));
		}
	};

	let mut lines = 0usize;
	for line in BufReader::new(file).lines() {
		line.map_err(|e| HarnessError::io(&path, e))?;
		lines += 1;
	}
	Ok(lines.saturating_sub(1))
}

pub fn result_file_name(database: &str) -> String {
	format!("{}_results.csv", database)
}

pub struct ResultRecorder {
	path: PathBuf,
	database: String,
}

impl ResultRecorder {
	/// Open `<dir>/<database>_results.csv` for appending, creating it with a
	/// header if it does not exist yet.
	pub fn open(dir: &Path, database: &str) -> Result<Self> {
		let recorder = ResultRecorder {
			path: dir.join(result_file_name(database)),
			database: database.to_string(),
		};
		recorder.append(None)?;
		Ok(recorder)
	}

	/// Start the file over with just the header.
	pub fn reset(dir: &Path, database: &str) -> Result<Self> {
		let path = dir.join(result_file_name(database));
		if path.exists() {
			fs::remove_file(&path).map_err(|e| HarnessError::io(&path, e))?;
		}
		ResultRecorder::open(dir, database)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn database(&self) -> &str {
		&self.database
	}

	pub fn record(&self, operation: &str, entity: &str, total: Duration, count: usize) -> Result<ResultRow> {
		let row = ResultRow::new(operation, &self.database, entity, total, count);
		self.append(Some(&row))?;
		debug!(
			"{} {} {}: {}s total, {}s avg over {}",
			row.database,
			row.operation,
			row.entity,
			row.total_time,
			row.avg_time,
			row.record_count
		);
		Ok(row)
	}

	pub fn read_rows(&self) -> Result<Vec<ResultRow>> {
		let mut reader = csv::Reader::from_path(&self.path).map_err(|e| HarnessError::csv(&self.path, e))?;
		reader
			.deserialize()
			.map(|row| row.map_err(|e| HarnessError::csv(&self.path, e)))
			.collect()
	}

	fn append(&self, row: Option<&ResultRow>) -> Result<()> {
		let exists = self.path.is_file();
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.map_err(|e| HarnessError::io(&self.path, e))?;

		let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
		if !exists {
			writer.write_record(RESULT_HEADER).map_err(|e| HarnessError::csv(&self.path, e))?;
		}
		if let Some(row) = row {
			writer.serialize(row).map_err(|e| HarnessError::csv(&self.path, e))?;
		}
		writer.flush().map_err(|e| HarnessError::io(&self.path, e))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn averages_and_rounds() {
		let row = ResultRow::new("read", "mysql", "users", Duration::from_micros(1_234_567), 5);
		assert_eq!(row.total_time, 1.2346);
		assert_eq!(row.avg_time, 0.246913);
		assert_eq!(row.record_count, 5);
	}

	#[test]
	fn zero_count_has_zero_average() {
		let row = ResultRow::new("delete", "mongodb", "reviews", Duration::from_secs(3), 0);
		assert_eq!(row.total_time, 3.0);
		assert_eq!(row.avg_time, 0.0);
	}

	#[test]
	fn header_is_written_once() {
		let dir = tempfile::tempdir().unwrap();

		let recorder = ResultRecorder::open(dir.path(), "mysql").unwrap();
		recorder.record("insert", "users", Duration::from_millis(10), 10).unwrap();
		drop(recorder);

		let recorder = ResultRecorder::open(dir.path(), "mysql").unwrap();
		recorder.record("read", "users", Duration::from_millis(2), 1).unwrap();

		let text = fs::read_to_string(recorder.path()).unwrap();
		let headers = text
			.lines()
			.filter(|line| *line == RESULT_HEADER.join(","))
			.count();
		assert_eq!(headers, 1);
		assert_eq!(text.lines().count(), 3);
		assert!(text.starts_with("operation,database,entity,total_time,avg_time,record_count\n"));

		let rows = recorder.read_rows().unwrap();
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[1].operation, "read");
		assert_eq!(rows[1].database, "mysql");
	}

	#[test]
	fn fresh_file_has_only_header() {
		let dir = tempfile::tempdir().unwrap();
		let recorder = ResultRecorder::open(dir.path(), "mongodb").unwrap();
		assert_eq!(recorder.path(), dir.path().join("mongodb_results.csv"));
		assert_eq!(fs::read_to_string(recorder.path()).unwrap(), format!("{}\n", RESULT_HEADER.join(",")));
	}

	#[test]
	fn reset_discards_previous_rows() {
		let dir = tempfile::tempdir().unwrap();
		let recorder = ResultRecorder::open(dir.path(), "mysql").unwrap();
		recorder.record("insert", "users", Duration::from_millis(1), 1).unwrap();

		let recorder = ResultRecorder::reset(dir.path(), "mysql").unwrap();
		assert!(recorder.read_rows().unwrap().is_empty());
	}

	#[test]
	fn detects_record_count_from_users_file() {
		let dir = tempfile::tempdir().unwrap();
		assert_eq!(detect_record_count(dir.path()).unwrap(), 0);

		fs::write(dir.path().join("users.csv"), "id,email\n1,a\n2,b\n3,c\n").unwrap();
		assert_eq!(detect_record_count(dir.path()).unwrap(), 3);
	}

	#[test]
	fn partitions_by_record_count() {
		let dir = tempfile::tempdir().unwrap();
		let flat = results_dir_for(dir.path(), ResultPartition::Flat).unwrap();
		assert_eq!(flat, dir.path());

		let partitioned = results_dir_for(dir.path(), ResultPartition::ByRecordCount(1000)).unwrap();
		assert_eq!(partitioned, dir.path().join("records_1000"));
		assert!(partitioned.is_dir());
	}
}
