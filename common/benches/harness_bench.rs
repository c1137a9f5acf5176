use std::sync::Arc;

use common::benchmark::{ insert_batches, AnalyticalQuery, DatabaseBenchmark };
use common::dataset::nest_order_items;
use common::generator::generate_dataset;
use common::memory::MemoryBenchmark;
use common::models::DataModel;
use common::sampler::sample_values;
use criterion::{ black_box, criterion_group, criterion_main, BenchmarkId, Criterion };
use rand::rngs::StdRng;
use rand::SeedableRng;

fn generation_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("generation");

	for count in [100usize, 1000] {
		group.bench_with_input(BenchmarkId::new("generate_dataset", count), &count, |b, &count| {
			let mut rng = StdRng::seed_from_u64(7);
			b.iter(|| black_box(generate_dataset(count, &mut rng)));
		});
	}

	let dataset = generate_dataset(1000, &mut StdRng::seed_from_u64(7));
	group.bench_function("nest_order_items_1000", |b| {
		b.iter(|| black_box(nest_order_items(&dataset.orders, &dataset.order_items)));
	});
	group.bench_function("sample_emails_100", |b| {
		let mut rng = StdRng::seed_from_u64(7);
		b.iter(|| black_box(sample_values(&dataset.users, "email", 100, &mut rng).unwrap()));
	});

	group.finish();
}

fn memory_target_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("memory_target");
	let rt = tokio::runtime::Runtime::new().unwrap();

	let dataset = generate_dataset(1000, &mut StdRng::seed_from_u64(11));
	let db = Arc::new(MemoryBenchmark::new(DataModel::Relational));
	rt.block_on(async {
		for batch in insert_batches(&dataset, None) {
			db.insert_many(batch).await.unwrap();
		}
	});

	for query in AnalyticalQuery::ALL {
		group.bench_function(query.name(), |b| {
			b.iter(|| rt.block_on(db.run_analytical(black_box(query))).unwrap());
		});
	}

	group.finish();
}

criterion_group!(benches, generation_benchmark, memory_target_benchmark);
criterion_main!(benches);
