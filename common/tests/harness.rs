use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::benchmark::{
	run_benchmark,
	AnalyticalQuery,
	BenchmarkSession,
	DatabaseBenchmark,
	DriverSettings,
	OperationKind,
};
use common::config::HarnessConfig;
use common::dataset::load_dataset;
use common::generator::generate_to_dir;
use common::memory::MemoryBenchmark;
use common::models::{ DataModel, Entity };
use common::recorder::{ ResultRecorder, ResultRow, RESULT_HEADER };
use common::sampler::{ sample_values, SamplePolicy, SamplingMode };
use common::timing::{ measure_execution, FailurePolicy };

fn config_for(root: &std::path::Path) -> HarnessConfig {
	HarnessConfig {
		data_dir: root.join("data"),
		results_dir: root.join("results"),
		..HarnessConfig::default()
	}
}

#[tokio::test]
async fn sampled_emails_are_timed_and_recorded() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	generate_to_dir(10, &data_dir).unwrap();

	let dataset = load_dataset(&data_dir).unwrap();
	let emails = sample_values(&dataset.users, "email", 5, &mut rand::thread_rng()).unwrap();
	let distinct: HashSet<_> = emails.iter().collect();
	assert_eq!(emails.len(), 5);
	assert_eq!(distinct.len(), 5);

	let duration = measure_execution(FailurePolicy::Propagate, || async {
		tokio::time::sleep(Duration::from_millis(5)).await;
		anyhow::Ok(())
	}).await.unwrap();
	let recorder = ResultRecorder::open(dir.path(), "memory").unwrap();
	let row = recorder.record("read", "users", duration, emails.len()).unwrap();
	assert_eq!(row.record_count, 5);
	assert!(row.total_time >= 0.005);
	let expected_avg = ((duration.as_secs_f64() / 5.0) * 1e6).round() / 1e6;
	assert_eq!(row.avg_time, expected_avg);
	assert_eq!(row, ResultRow::new("read", "memory", "users", duration, 5));
	assert_eq!(recorder.read_rows().unwrap(), vec![row]);
}

#[tokio::test]
async fn clear_then_insert_stores_every_generated_record() {
	let dir = tempfile::tempdir().unwrap();
	let stale = generate_to_dir(25, &dir.path().join("stale")).unwrap();
	let data_dir = dir.path().join("data");
	let generated = generate_to_dir(10, &data_dir).unwrap();
	let dataset = load_dataset(&data_dir).unwrap();
	assert_eq!(dataset, generated);

	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational));
	let recorder = ResultRecorder::open(dir.path(), "memory").unwrap();
	let settings = DriverSettings { run_analytical: false, ..DriverSettings::default() };
	let mut session = BenchmarkSession::new(db.clone(), recorder, settings);

	// A previous, larger run left its rows behind.
	for batch in common::benchmark::insert_batches(&stale, None) {
		db.insert_many(batch).await.unwrap();
	}
	assert_eq!(db.count(Entity::Users).await.unwrap(), 25);

	db.clear().await.unwrap();
	for batch in common::benchmark::insert_batches(&dataset, None) {
		session.execute(&common::benchmark::InsertOperation { batch }).await.unwrap();
	}
	for entity in [Entity::Users, Entity::Products, Entity::Orders, Entity::Reviews] {
		assert_eq!(db.count(entity).await.unwrap(), 10, "{}", entity);
	}
	assert_eq!(db.count(Entity::OrderItems).await.unwrap() as usize, dataset.order_items.len());
}

#[tokio::test]
async fn full_run_writes_every_phase_once() {
	let dir = tempfile::tempdir().unwrap();
	let config = config_for(dir.path());
	generate_to_dir(40, &config.data_dir).unwrap();

	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational));
	let report = run_benchmark(db, &config).await.unwrap();

	// 5 inserts, 4 reads, 4 updates, 7 queries, 5 deletes
	assert_eq!(report.results.len(), 25);
	assert_eq!(report.rows_for(OperationKind::Insert).count(), 5);
	assert_eq!(report.rows_for(OperationKind::Complex).count(), AnalyticalQuery::ALL.len());
	assert!(report.rows_for(OperationKind::Complex).all(|row| row.record_count == 1));
	assert_eq!(report.record_count, 40);
	assert!(report.max_total_time() >= 0.0);

	let path = config.results_dir.join("records_40").join("memory_results.csv");
	let text = fs::read_to_string(&path).unwrap();
	let header = RESULT_HEADER.join(",");
	assert_eq!(text.lines().filter(|line| *line == header).count(), 1);
	assert_eq!(text.lines().count(), 26);

	let json = serde_json::to_value(&report).unwrap();
	assert_eq!(json["database"], "memory");
	assert_eq!(json["data_model"], "relational");
}

#[tokio::test]
async fn repeated_runs_append_to_one_file() {
	let dir = tempfile::tempdir().unwrap();
	let config = HarnessConfig { run_analytical: false, partition_results: false, ..config_for(dir.path()) };
	generate_to_dir(20, &config.data_dir).unwrap();

	run_benchmark(Arc::new(MemoryBenchmark::new(DataModel::Relational)), &config).await.unwrap();
	run_benchmark(Arc::new(MemoryBenchmark::new(DataModel::Relational)), &config).await.unwrap();

	let recorder = ResultRecorder::open(&config.results_dir, "memory").unwrap();
	assert_eq!(recorder.read_rows().unwrap().len(), 36);

	let config = HarnessConfig { reset_results: true, ..config };
	run_benchmark(Arc::new(MemoryBenchmark::new(DataModel::Relational)), &config).await.unwrap();
	assert_eq!(recorder.read_rows().unwrap().len(), 18);
}

#[tokio::test]
async fn document_model_skips_item_phases() {
	let dir = tempfile::tempdir().unwrap();
	let config = HarnessConfig { sampling: SamplingMode::Half, ..config_for(dir.path()) };
	generate_to_dir(20, &config.data_dir).unwrap();

	let db = Arc::new(MemoryBenchmark::new(DataModel::Document));
	let report = run_benchmark(db, &config).await.unwrap();

	assert!(report.results.iter().all(|row| row.entity != "order_items"));
	let read_users = report.results
		.iter()
		.find(|row| row.operation == "read" && row.entity == "users")
		.unwrap();
	assert_eq!(read_users.record_count, SamplePolicy::half().sample_size(20));
	assert_eq!(report.database, "memory_documents");
}

#[tokio::test]
async fn record_zero_keeps_the_run_going() {
	let dir = tempfile::tempdir().unwrap();
	let config = HarnessConfig { run_analytical: false, ..config_for(dir.path()) };
	generate_to_dir(20, &config.data_dir).unwrap();

	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational).failing_on(Entity::Reviews));
	let report = run_benchmark(db, &config).await.unwrap();

	let failed: Vec<_> = report.results
		.iter()
		.filter(|row| row.entity == "reviews" && row.operation != "insert")
		.collect();
	assert_eq!(failed.len(), 3);
	assert!(failed.iter().all(|row| row.total_time == 0.0 && row.avg_time == 0.0));
	assert_eq!(report.results.len(), 18);
}

#[tokio::test]
async fn propagate_aborts_on_first_failure() {
	let dir = tempfile::tempdir().unwrap();
	let config = HarnessConfig { on_failure: FailurePolicy::Propagate, ..config_for(dir.path()) };
	generate_to_dir(20, &config.data_dir).unwrap();

	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational).failing_on(Entity::Reviews));
	assert!(run_benchmark(db, &config).await.is_err());
}

#[tokio::test]
async fn missing_data_is_an_error() {
	let dir = tempfile::tempdir().unwrap();
	let config = config_for(dir.path());
	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational));
	assert!(run_benchmark(db, &config).await.is_err());
	assert!(measure_execution(FailurePolicy::RecordZero, || async {
		tokio::time::sleep(Duration::from_millis(1)).await;
		anyhow::Ok(())
	}).await.is_ok());
}
