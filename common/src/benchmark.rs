use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::Serialize;
use tracing::{ debug, info, Level };

use crate::config::HarnessConfig;
use crate::dataset::{ load_dataset, nest_order_items, status_histogram };
use crate::models::{
	DataModel,
	Dataset,
	Entity,
	FieldValue,
	NestedOrder,
	Order,
	OrderItem,
	Product,
	Record,
	Review,
	User,
};
use crate::recorder::{ detect_record_count, results_dir_for, ResultPartition, ResultRecorder, ResultRow };
use crate::sampler::{ sample_values, SamplePolicy };
use crate::timing::{ measure_execution, FailurePolicy };

/// A target database as seen by the harness.
///
/// Implementations own their connection and query dialect; the harness only
/// needs bulk inserts, equality lookups, updates and deletes, and the fixed
/// analytical battery.
#[async_trait]
pub trait DatabaseBenchmark: Send + Sync {
	/// Identifier written to the `database` column of the result file
	fn database_name(&self) -> String;

	/// Whether orders are stored with their items embedded
	fn data_model(&self) -> DataModel;

	/// Create schema and indexes if needed
	async fn init(&self) -> Result<()>;

	/// Remove all data for every known entity
	async fn clear(&self) -> Result<()>;

	/// Insert a whole table in one batch
	async fn insert_many(&self, batch: InsertBatch<'_>) -> Result<()>;

	/// Fetch every record whose `field` equals `value`; returns rows seen
	async fn find_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<usize>;

	/// Apply the entity's benchmark mutation to records matching `value`
	async fn update_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64>;

	/// Delete records matching `value`
	async fn delete_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64>;

	/// Run one analytical query and return the number of result rows
	async fn run_analytical(&self, query: AnalyticalQuery) -> Result<usize>;

	/// Number of stored records of `entity`
	async fn count(&self, entity: Entity) -> Result<u64>;
}

/// A table handed to `insert_many`.
#[derive(Debug, Clone, Copy)]
pub enum InsertBatch<'a> {
	Users(&'a [User]),
	Products(&'a [Product]),
	Orders(&'a [Order]),
	NestedOrders(&'a [NestedOrder]),
	OrderItems(&'a [OrderItem]),
	Reviews(&'a [Review]),
}

impl<'a> InsertBatch<'a> {
	pub fn entity(&self) -> Entity {
		match self {
			InsertBatch::Users(_) => Entity::Users,
			InsertBatch::Products(_) => Entity::Products,
			InsertBatch::Orders(_) | InsertBatch::NestedOrders(_) => Entity::Orders,
			InsertBatch::OrderItems(_) => Entity::OrderItems,
			InsertBatch::Reviews(_) => Entity::Reviews,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			InsertBatch::Users(rows) => rows.len(),
			InsertBatch::Products(rows) => rows.len(),
			InsertBatch::Orders(rows) => rows.len(),
			InsertBatch::NestedOrders(rows) => rows.len(),
			InsertBatch::OrderItems(rows) => rows.len(),
			InsertBatch::Reviews(rows) => rows.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	Insert,
	Read,
	Update,
	Delete,
	Complex,
}

impl OperationKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			OperationKind::Insert => "insert",
			OperationKind::Read => "read",
			OperationKind::Update => "update",
			OperationKind::Delete => "delete",
			OperationKind::Complex => "complex",
		}
	}
}

/// The fixed analytical battery. Results are discarded; only timing counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticalQuery {
	/// Top 10 products by number of order lines
	PopularProducts,
	/// Top 10 products by average rating, at least 5 reviews
	AvgProductRating,
	/// Top 20 users by `sum(price * quantity)` over their order lines
	CustomerSpending,
	/// Products mentioning "laptop", priced 100..=500, in stock
	ProductSearch,
	/// Order count and revenue per day over the last 30 days
	SalesDashboard,
	/// Top 10 product pairs bought in the same order
	ProductRecommendations,
	/// Reviews whose author ordered the reviewed product
	VerifiedPurchases,
}

impl AnalyticalQuery {
	pub const ALL: [AnalyticalQuery; 7] = [
		AnalyticalQuery::PopularProducts,
		AnalyticalQuery::AvgProductRating,
		AnalyticalQuery::CustomerSpending,
		AnalyticalQuery::ProductSearch,
		AnalyticalQuery::SalesDashboard,
		AnalyticalQuery::ProductRecommendations,
		AnalyticalQuery::VerifiedPurchases,
	];

	pub fn name(&self) -> &'static str {
		match self {
			AnalyticalQuery::PopularProducts => "popular_products",
			AnalyticalQuery::AvgProductRating => "avg_product_rating",
			AnalyticalQuery::CustomerSpending => "customer_spending",
			AnalyticalQuery::ProductSearch => "product_search",
			AnalyticalQuery::SalesDashboard => "sales_dashboard",
			AnalyticalQuery::ProductRecommendations => "product_recommendations",
			AnalyticalQuery::VerifiedPurchases => "verified_purchases",
		}
	}
}

pub const MIN_REVIEWS_FOR_RATING: usize = 5;
pub const SALES_WINDOW_DAYS: i64 = 30;
pub const SEARCH_TERM: &str = "laptop";
pub const SEARCH_PRICE_RANGE: (f64, f64) = (100.0, 500.0);
pub const VERIFIED_PURCHASES_LIMIT: usize = 100;

/// One timed unit of work with its arguments already bound.
#[async_trait]
pub trait Operation: Send + Sync {
	fn kind(&self) -> OperationKind;

	/// Value of the `entity` column in the result file
	fn label(&self) -> String;

	/// Number of records the operation covers, used for the average
	fn record_count(&self) -> usize;

	async fn run(&self, db: &dyn DatabaseBenchmark) -> Result<()>;
}

pub struct InsertOperation<'a> {
	pub batch: InsertBatch<'a>,
}

#[async_trait]
impl<'a> Operation for InsertOperation<'a> {
	fn kind(&self) -> OperationKind {
		OperationKind::Insert
	}

	fn label(&self) -> String {
		self.batch.entity().to_string()
	}

	fn record_count(&self) -> usize {
		self.batch.len()
	}

	async fn run(&self, db: &dyn DatabaseBenchmark) -> Result<()> {
		if self.batch.is_empty() {
			return Ok(());
		}
		db.insert_many(self.batch).await
	}
}

/// Lookup, update or delete of every bound value, one call per value.
pub struct KeyedOperation {
	pub kind: OperationKind,
	pub entity: Entity,
	pub field: &'static str,
	pub values: Vec<FieldValue>,
}

pub struct ReadOperation(pub KeyedOperation);
pub struct UpdateOperation(pub KeyedOperation);
pub struct DeleteOperation(pub KeyedOperation);

impl ReadOperation {
	pub fn new(entity: Entity, field: &'static str, values: Vec<FieldValue>) -> Self {
		ReadOperation(KeyedOperation { kind: OperationKind::Read, entity, field, values })
	}
}

impl UpdateOperation {
	pub fn new(entity: Entity, field: &'static str, values: Vec<FieldValue>) -> Self {
		UpdateOperation(KeyedOperation { kind: OperationKind::Update, entity, field, values })
	}
}

impl DeleteOperation {
	pub fn new(entity: Entity, field: &'static str, values: Vec<FieldValue>) -> Self {
		DeleteOperation(KeyedOperation { kind: OperationKind::Delete, entity, field, values })
	}
}

macro_rules! keyed_operation {
	($name:ident, $method:ident) => {
		#[async_trait]
		impl Operation for $name {
			fn kind(&self) -> OperationKind {
				self.0.kind
			}

			fn label(&self) -> String {
				self.0.entity.to_string()
			}

			fn record_count(&self) -> usize {
				self.0.values.len()
			}

			async fn run(&self, db: &dyn DatabaseBenchmark) -> Result<()> {
				for value in &self.0.values {
					db.$method(self.0.entity, self.0.field, value).await?;
				}
				Ok(())
			}
		}
	};
}

keyed_operation!(ReadOperation, find_by);
keyed_operation!(UpdateOperation, update_by);
keyed_operation!(DeleteOperation, delete_by);

pub struct AnalyticalOperation {
	pub query: AnalyticalQuery,
}

#[async_trait]
impl Operation for AnalyticalOperation {
	fn kind(&self) -> OperationKind {
		OperationKind::Complex
	}

	fn label(&self) -> String {
		self.query.name().to_string()
	}

	fn record_count(&self) -> usize {
		1
	}

	async fn run(&self, db: &dyn DatabaseBenchmark) -> Result<()> {
		let rows = db.run_analytical(self.query).await?;
		debug!("{} returned {} rows", self.query.name(), rows);
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSettings {
	pub on_failure: FailurePolicy,
	pub read: SamplePolicy,
	pub update: SamplePolicy,
	pub delete: SamplePolicy,
	pub run_analytical: bool,
}

impl Default for DriverSettings {
	fn default() -> Self {
		DriverSettings {
			on_failure: FailurePolicy::RecordZero,
			read: SamplePolicy::reads(),
			update: SamplePolicy::updates(),
			delete: SamplePolicy::deletes(),
			run_analytical: true,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
	pub database: String,
	pub data_model: DataModel,
	pub record_count: usize,
	pub results: Vec<ResultRow>,
	pub elapsed_secs: f64,
	pub timestamp: DateTime<Utc>,
}

impl BenchmarkReport {
	/// Longest single measurement, in seconds.
	pub fn max_total_time(&self) -> f64 {
		self.results
			.iter()
			.map(|row| row.total_time)
			.fold(0.0, f64::max)
	}

	pub fn rows_for(&self, kind: OperationKind) -> impl Iterator<Item = &ResultRow> {
		self.results.iter().filter(move |row| row.operation == kind.as_str())
	}
}

/// Everything one benchmark run against one target needs.
pub struct BenchmarkSession {
	db: Arc<dyn DatabaseBenchmark>,
	recorder: ResultRecorder,
	settings: DriverSettings,
	results: Vec<ResultRow>,
}

impl BenchmarkSession {
	pub fn new(db: Arc<dyn DatabaseBenchmark>, recorder: ResultRecorder, settings: DriverSettings) -> Self {
		BenchmarkSession {
			db,
			recorder,
			settings,
			results: Vec::new(),
		}
	}

	pub fn recorder(&self) -> &ResultRecorder {
		&self.recorder
	}

	/// Clear, insert, read, update, optionally query, then delete.
	pub async fn run(mut self, dataset: &Dataset) -> Result<BenchmarkReport> {
		let started = Instant::now();
		let database = self.db.database_name();
		let data_model = self.db.data_model();
		info!("Running {} benchmark over {} records", database, dataset.users.len());

		self.db.init().await?;

		info!("Clearing existing {} data", database);
		self.db.clear().await?;

		let nested = match data_model {
			DataModel::Document => {
				info!("Nesting order items into orders");
				Some(nest_order_items(&dataset.orders, &dataset.order_items))
			}
			DataModel::Relational => None,
		};

		info!("INSERT");
		for batch in insert_batches(dataset, nested.as_deref()) {
			self.execute(&InsertOperation { batch }).await?;
		}
		if tracing::enabled!(Level::DEBUG) {
			self.log_stored_counts(dataset).await?;
		}

		info!("READ");
		let reads = self.read_operations(dataset)?;
		self.execute_all(&reads).await?;

		info!("UPDATE");
		let updates = self.update_operations(dataset)?;
		self.execute_all(&updates).await?;

		if self.settings.run_analytical {
			info!("COMPLEX QUERIES");
			for query in AnalyticalQuery::ALL {
				self.execute(&AnalyticalOperation { query }).await?;
			}
		}

		info!("DELETE");
		let deletes = self.delete_operations(dataset, data_model)?;
		self.execute_all(&deletes).await?;

		let report = BenchmarkReport {
			database,
			data_model,
			record_count: dataset.users.len(),
			results: self.results,
			elapsed_secs: started.elapsed().as_secs_f64(),
			timestamp: Utc::now(),
		};
		info!(
			"{} benchmark finished in {:.2}s, results in {}",
			report.database,
			report.elapsed_secs,
			self.recorder.path().display()
		);
		Ok(report)
	}

	/// Time one operation and record it.
	pub async fn execute(&mut self, operation: &dyn Operation) -> Result<ResultRow> {
		let db = self.db.as_ref();
		let duration = measure_execution(self.settings.on_failure, || operation.run(db)).await?;
		let row = self.recorder.record(
			operation.kind().as_str(),
			&operation.label(),
			duration,
			operation.record_count()
		)?;
		self.results.push(row.clone());
		Ok(row)
	}

	async fn execute_all(&mut self, operations: &[Box<dyn Operation>]) -> Result<()> {
		for operation in operations {
			self.execute(operation.as_ref()).await?;
		}
		Ok(())
	}

	// Sampling happens here, outside the timed section.
	fn read_operations(&self, dataset: &Dataset) -> Result<Vec<Box<dyn Operation>>> {
		let policy = self.settings.read;
		let operations: Vec<Box<dyn Operation>> = vec![
			Box::new(ReadOperation::new(Entity::Users, "email", sample(&dataset.users, "email", policy)?)),
			Box::new(ReadOperation::new(Entity::Products, "name", sample(&dataset.products, "name", policy)?)),
			Box::new(ReadOperation::new(Entity::Orders, "user_id", sample(&dataset.orders, "user_id", policy)?)),
			Box::new(
				ReadOperation::new(Entity::Reviews, "product_id", sample(&dataset.reviews, "product_id", policy)?)
			)
		];
		Ok(operations)
	}

	fn update_operations(&self, dataset: &Dataset) -> Result<Vec<Box<dyn Operation>>> {
		let policy = self.settings.update;
		let operations: Vec<Box<dyn Operation>> = vec![
			Box::new(UpdateOperation::new(Entity::Users, "email", sample(&dataset.users, "email", policy)?)),
			Box::new(UpdateOperation::new(Entity::Products, "name", sample(&dataset.products, "name", policy)?)),
			Box::new(UpdateOperation::new(Entity::Orders, "id", sample(&dataset.orders, "id", policy)?)),
			Box::new(UpdateOperation::new(Entity::Reviews, "id", sample(&dataset.reviews, "id", policy)?))
		];
		Ok(operations)
	}

	// Dependents go first so parents are never deleted out from under them.
	fn delete_operations(&self, dataset: &Dataset, data_model: DataModel) -> Result<Vec<Box<dyn Operation>>> {
		let policy = self.settings.delete;
		let mut operations: Vec<Box<dyn Operation>> = vec![
			Box::new(DeleteOperation::new(Entity::Reviews, "id", sample(&dataset.reviews, "id", policy)?))
		];

		if data_model == DataModel::Relational {
			// Items are removed per parent order, sized by the item table.
			let count = policy.sample_size(dataset.order_items.len());
			let order_ids = sample_values(&dataset.orders, "id", count, &mut rand::thread_rng())?;
			operations.push(Box::new(DeleteOperation::new(Entity::OrderItems, "order_id", order_ids)));
		}

		operations.push(Box::new(DeleteOperation::new(Entity::Orders, "id", sample(&dataset.orders, "id", policy)?)));
		operations.push(
			Box::new(DeleteOperation::new(Entity::Products, "name", sample(&dataset.products, "name", policy)?))
		);
		operations.push(Box::new(DeleteOperation::new(Entity::Users, "email", sample(&dataset.users, "email", policy)?)));

		Ok(operations)
	}

	async fn log_stored_counts(&self, dataset: &Dataset) -> Result<()> {
		for entity in Entity::ALL {
			if entity == Entity::OrderItems && self.db.data_model() == DataModel::Document {
				continue;
			}
			let stored = self.db.count(entity).await?;
			debug!("{} holds {} {} (generated {})", self.db.database_name(), stored, entity, dataset.len_of(entity));
		}
		debug!("Order status mix: {:?}", status_histogram(&dataset.orders));
		Ok(())
	}
}

/// Tables in dependency order for the target's data model.
pub fn insert_batches<'a>(dataset: &'a Dataset, nested: Option<&'a [NestedOrder]>) -> Vec<InsertBatch<'a>> {
	let mut batches = vec![InsertBatch::Users(&dataset.users), InsertBatch::Products(&dataset.products)];
	match nested {
		Some(orders) => batches.push(InsertBatch::NestedOrders(orders)),
		None => {
			batches.push(InsertBatch::Orders(&dataset.orders));
			batches.push(InsertBatch::OrderItems(&dataset.order_items));
		}
	}
	batches.push(InsertBatch::Reviews(&dataset.reviews));
	batches
}

fn sample<T: Record>(records: &[T], field: &str, policy: SamplePolicy) -> Result<Vec<FieldValue>> {
	let count = policy.sample_size(records.len());
	Ok(sample_values(records, field, count, &mut rand::thread_rng())?)
}

/// Load the generated data, open the result file and benchmark `db` once.
pub async fn run_benchmark(db: Arc<dyn DatabaseBenchmark>, config: &HarnessConfig) -> Result<BenchmarkReport> {
	info!("Loading generated data from {}", config.data_dir.display());
	let dataset = load_dataset(&config.data_dir)?;

	let partition = if config.partition_results {
		ResultPartition::ByRecordCount(detect_record_count(&config.data_dir)?)
	} else {
		ResultPartition::Flat
	};
	let results_dir = results_dir_for(&config.results_dir, partition)?;

	let database = db.database_name();
	let recorder = if config.reset_results {
		ResultRecorder::reset(&results_dir, &database)?
	} else {
		ResultRecorder::open(&results_dir, &database)?
	};

	BenchmarkSession::new(db, recorder, config.driver_settings()).run(&dataset).await
}
