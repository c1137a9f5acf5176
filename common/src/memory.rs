//! In-memory benchmark target
//!
//! Keeps every table in process memory behind a mutex. It implements the
//! same contract as the real targets, including the analytical battery, so
//! the harness can be exercised without a database server. Nothing here
//! enforces foreign keys.

use std::cmp::Ordering;
use std::collections::{ BTreeMap, HashMap, HashSet };

use anyhow::{ bail, Result };
use async_trait::async_trait;
use chrono::{ Duration, Local, NaiveDateTime };
use tokio::sync::Mutex;

use crate::benchmark::{
	AnalyticalQuery,
	DatabaseBenchmark,
	InsertBatch,
	MIN_REVIEWS_FOR_RATING,
	SALES_WINDOW_DAYS,
	SEARCH_PRICE_RANGE,
	SEARCH_TERM,
	VERIFIED_PURCHASES_LIMIT,
};
use crate::error::HarnessError;
use crate::models::{
	DataModel,
	Entity,
	FieldValue,
	NestedOrder,
	Order,
	OrderItem,
	OrderStatus,
	Product,
	Record,
	Review,
	User,
};

#[derive(Debug, Default, Clone)]
pub struct MemoryTables {
	pub users: Vec<User>,
	pub products: Vec<Product>,
	pub orders: Vec<Order>,
	pub nested_orders: Vec<NestedOrder>,
	pub order_items: Vec<OrderItem>,
	pub reviews: Vec<Review>,
}

/// One order line joined with its order.
#[derive(Debug, Clone, Copy)]
struct OrderLine {
	order_id: i64,
	user_id: i64,
	order_date: NaiveDateTime,
	product_id: i64,
	quantity: i32,
	price: f64,
}

impl OrderLine {
	fn value(&self) -> f64 {
		self.price * f64::from(self.quantity)
	}
}

impl MemoryTables {
	fn order_lines(&self) -> Vec<OrderLine> {
		if !self.nested_orders.is_empty() {
			return self.nested_orders
				.iter()
				.flat_map(|order| {
					order.items.iter().map(move |item| OrderLine {
						order_id: order.id,
						user_id: order.user_id,
						order_date: order.order_date,
						product_id: item.product_id,
						quantity: item.quantity,
						price: item.price,
					})
				})
				.collect();
		}

		let orders: HashMap<i64, &Order> = self.orders
			.iter()
			.map(|order| (order.id, order))
			.collect();
		self.order_items
			.iter()
			.filter_map(|item| {
				orders.get(&item.order_id).map(|order| OrderLine {
					order_id: order.id,
					user_id: order.user_id,
					order_date: order.order_date,
					product_id: item.product_id,
					quantity: item.quantity,
					price: item.price,
				})
			})
			.collect()
	}

	fn popular_products(&self) -> usize {
		let mut counts: HashMap<i64, usize> = HashMap::new();
		for line in self.order_lines() {
			*counts.entry(line.product_id).or_insert(0) += 1;
		}
		let products: HashSet<i64> = self.products
			.iter()
			.map(|p| p.id)
			.collect();

		let mut ranked: Vec<(i64, usize)> = counts
			.into_iter()
			.filter(|(id, _)| products.contains(id))
			.collect();
		ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
		ranked.truncate(10);
		ranked.len()
	}

	fn avg_product_rating(&self) -> usize {
		let mut ratings: HashMap<i64, (i64, usize)> = HashMap::new();
		for review in &self.reviews {
			let entry = ratings.entry(review.product_id).or_insert((0, 0));
			entry.0 += i64::from(review.rating);
			entry.1 += 1;
		}
		let products: HashSet<i64> = self.products
			.iter()
			.map(|p| p.id)
			.collect();

		let mut ranked: Vec<(i64, f64)> = ratings
			.into_iter()
			.filter(|(id, (_, count))| *count >= MIN_REVIEWS_FOR_RATING && products.contains(id))
			.map(|(id, (sum, count))| (id, (sum as f64) / (count as f64)))
			.collect();
		ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
		ranked.truncate(10);
		ranked.len()
	}

	fn customer_spending(&self) -> usize {
		let users: HashSet<i64> = self.users
			.iter()
			.map(|u| u.id)
			.collect();
		let mut spending: HashMap<i64, f64> = HashMap::new();
		for line in self.order_lines() {
			if users.contains(&line.user_id) {
				*spending.entry(line.user_id).or_insert(0.0) += line.value();
			}
		}

		let mut ranked: Vec<(i64, f64)> = spending.into_iter().collect();
		ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
		ranked.truncate(20);
		ranked.len()
	}

	fn product_search(&self) -> usize {
		let (low, high) = SEARCH_PRICE_RANGE;
		let mut hits: Vec<&Product> = self.products
			.iter()
			.filter(|p| {
				p.name.to_lowercase().contains(SEARCH_TERM) ||
					p.description.to_lowercase().contains(SEARCH_TERM)
			})
			.filter(|p| p.price >= low && p.price <= high && p.stock > 0)
			.collect();
		hits.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
		hits.len()
	}

	fn sales_dashboard(&self, now: NaiveDateTime) -> usize {
		let since = now - Duration::days(SALES_WINDOW_DAYS);
		let mut days: BTreeMap<chrono::NaiveDate, (usize, f64)> = BTreeMap::new();
		for line in self.order_lines() {
			if line.order_date >= since {
				let day = days.entry(line.order_date.date()).or_insert((0, 0.0));
				day.0 += 1;
				day.1 += line.value();
			}
		}
		days.len()
	}

	fn product_recommendations(&self) -> usize {
		let mut by_order: HashMap<i64, Vec<i64>> = HashMap::new();
		for line in self.order_lines() {
			by_order.entry(line.order_id).or_default().push(line.product_id);
		}

		let mut pairs: HashMap<(i64, i64), usize> = HashMap::new();
		for products in by_order.values() {
			for a in products {
				for b in products {
					if a < b {
						*pairs.entry((*a, *b)).or_insert(0) += 1;
					}
				}
			}
		}

		let mut ranked: Vec<((i64, i64), usize)> = pairs.into_iter().collect();
		ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
		ranked.truncate(10);
		ranked.len()
	}

	fn verified_purchases(&self) -> usize {
		let purchased: HashSet<(i64, i64)> = self
			.order_lines()
			.into_iter()
			.map(|line| (line.user_id, line.product_id))
			.collect();
		self.reviews
			.iter()
			.filter(|review| purchased.contains(&(review.user_id, review.product_id)))
			.take(VERIFIED_PURCHASES_LIMIT)
			.count()
	}
}

pub struct MemoryBenchmark {
	name: String,
	data_model: DataModel,
	tables: Mutex<MemoryTables>,
	failing: Option<Entity>,
}

impl MemoryBenchmark {
	pub fn new(data_model: DataModel) -> Self {
		let name = match data_model {
			DataModel::Relational => "memory",
			DataModel::Document => "memory_documents",
		};
		MemoryBenchmark {
			name: name.to_string(),
			data_model,
			tables: Mutex::new(MemoryTables::default()),
			failing: None,
		}
	}

	/// Make every lookup, update and delete touching `entity` fail.
	pub fn failing_on(mut self, entity: Entity) -> Self {
		self.failing = Some(entity);
		self
	}

	pub async fn snapshot(&self) -> MemoryTables {
		self.tables.lock().await.clone()
	}

	fn check(&self, entity: Entity, field: &str) -> Result<()> {
		if self.failing == Some(entity) {
			bail!("{} is unavailable", entity);
		}
		if !entity.has_field(field) {
			return Err(
				(HarnessError::UnknownField {
					entity,
					field: field.to_string(),
				}).into()
			);
		}
		Ok(())
	}
}

fn matches<T: Record>(record: &T, field: &str, value: &FieldValue) -> bool {
	record.field(field).as_ref() == Some(value)
}

/// Relational targets delete every match, document targets the first one.
fn remove_matching<T: Record>(rows: &mut Vec<T>, field: &str, value: &FieldValue, model: DataModel) -> u64 {
	match model {
		DataModel::Relational => {
			let before = rows.len();
			rows.retain(|row| !matches(row, field, value));
			(before - rows.len()) as u64
		}
		DataModel::Document =>
			match rows.iter().position(|row| matches(row, field, value)) {
				Some(index) => {
					rows.remove(index);
					1
				}
				None => 0,
			}
	}
}

/// Same rule for updates: every match, or only the first.
fn update_matching<T: Record>(
	rows: &mut [T],
	field: &str,
	value: &FieldValue,
	model: DataModel,
	mut apply: impl FnMut(&mut T)
) -> u64 {
	let mut updated = 0;
	for row in rows.iter_mut() {
		if matches(row, field, value) {
			apply(row);
			updated += 1;
			if model == DataModel::Document {
				break;
			}
		}
	}
	updated
}

fn count_matching<T: Record>(rows: &[T], field: &str, value: &FieldValue) -> usize {
	rows.iter()
		.filter(|row| matches(*row, field, value))
		.count()
}

#[async_trait]
impl DatabaseBenchmark for MemoryBenchmark {
	fn database_name(&self) -> String {
		self.name.clone()
	}

	fn data_model(&self) -> DataModel {
		self.data_model
	}

	async fn init(&self) -> Result<()> {
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		*self.tables.lock().await = MemoryTables::default();
		Ok(())
	}

	async fn insert_many(&self, batch: InsertBatch<'_>) -> Result<()> {
		let mut tables = self.tables.lock().await;
		match batch {
			InsertBatch::Users(rows) => tables.users.extend_from_slice(rows),
			InsertBatch::Products(rows) => tables.products.extend_from_slice(rows),
			InsertBatch::Orders(rows) => tables.orders.extend_from_slice(rows),
			InsertBatch::NestedOrders(rows) => tables.nested_orders.extend_from_slice(rows),
			InsertBatch::OrderItems(rows) => tables.order_items.extend_from_slice(rows),
			InsertBatch::Reviews(rows) => tables.reviews.extend_from_slice(rows),
		}
		Ok(())
	}

	async fn find_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<usize> {
		self.check(entity, field)?;
		let tables = self.tables.lock().await;
		Ok(match entity {
			Entity::Users => count_matching(&tables.users, field, value),
			Entity::Products => count_matching(&tables.products, field, value),
			Entity::Orders if self.data_model == DataModel::Document => {
				count_matching(&tables.nested_orders, field, value)
			}
			Entity::Orders => count_matching(&tables.orders, field, value),
			Entity::OrderItems => count_matching(&tables.order_items, field, value),
			Entity::Reviews => count_matching(&tables.reviews, field, value),
		})
	}

	async fn update_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64> {
		self.check(entity, field)?;
		let model = self.data_model;
		let now = Local::now().naive_local();
		let mut tables = self.tables.lock().await;
		Ok(match entity {
			Entity::Users => {
				update_matching(&mut tables.users, field, value, model, |user| {
					user.registration_date = now;
				})
			}
			Entity::Products => {
				update_matching(&mut tables.products, field, value, model, |product| {
					product.stock += 1;
				})
			}
			Entity::Orders if model == DataModel::Document => {
				update_matching(&mut tables.nested_orders, field, value, model, |order| {
					order.status = OrderStatus::Completed;
				})
			}
			Entity::Orders => {
				update_matching(&mut tables.orders, field, value, model, |order| {
					order.status = OrderStatus::Completed;
				})
			}
			Entity::OrderItems => bail!("no benchmark update is defined for order_items"),
			Entity::Reviews => {
				update_matching(&mut tables.reviews, field, value, model, |review| {
					review.rating = 5;
				})
			}
		})
	}

	async fn delete_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64> {
		self.check(entity, field)?;
		let model = self.data_model;
		let mut tables = self.tables.lock().await;
		Ok(match entity {
			Entity::Users => remove_matching(&mut tables.users, field, value, model),
			Entity::Products => remove_matching(&mut tables.products, field, value, model),
			Entity::Orders if model == DataModel::Document => {
				remove_matching(&mut tables.nested_orders, field, value, model)
			}
			Entity::Orders => remove_matching(&mut tables.orders, field, value, model),
			Entity::OrderItems => remove_matching(&mut tables.order_items, field, value, model),
			Entity::Reviews => remove_matching(&mut tables.reviews, field, value, model),
		})
	}

	async fn run_analytical(&self, query: AnalyticalQuery) -> Result<usize> {
		let tables = self.tables.lock().await;
		Ok(match query {
			AnalyticalQuery::PopularProducts => tables.popular_products(),
			AnalyticalQuery::AvgProductRating => tables.avg_product_rating(),
			AnalyticalQuery::CustomerSpending => tables.customer_spending(),
			AnalyticalQuery::ProductSearch => tables.product_search(),
			AnalyticalQuery::SalesDashboard => tables.sales_dashboard(Local::now().naive_local()),
			AnalyticalQuery::ProductRecommendations => tables.product_recommendations(),
			AnalyticalQuery::VerifiedPurchases => tables.verified_purchases(),
		})
	}

	async fn count(&self, entity: Entity) -> Result<u64> {
		let tables = self.tables.lock().await;
		let count = match entity {
			Entity::Users => tables.users.len(),
			Entity::Products => tables.products.len(),
			Entity::Orders if self.data_model == DataModel::Document => tables.nested_orders.len(),
			Entity::Orders => tables.orders.len(),
			Entity::OrderItems if self.data_model == DataModel::Document => {
				tables.nested_orders
					.iter()
					.map(|order| order.items.len())
					.sum()
			}
			Entity::OrderItems => tables.order_items.len(),
			Entity::Reviews => tables.reviews.len(),
		};
		Ok(count as u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::nest_order_items;
	use crate::generator::generate_dataset;
	use crate::models::Dataset;
	use chrono::NaiveDate;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn at(day: u32) -> NaiveDateTime {
		NaiveDate::from_ymd_opt(2024, 6, day).unwrap().and_hms_opt(12, 0, 0).unwrap()
	}

	fn product(id: i64, name: &str, price: f64, stock: i32) -> Product {
		Product {
			id,
			name: name.to_string(),
			description: "Plain description.".to_string(),
			price,
			stock,
		}
	}

	fn item(id: i64, order_id: i64, product_id: i64) -> OrderItem {
		OrderItem { id, order_id, product_id, quantity: 2, price: 10.0 }
	}

	fn order(id: i64, user_id: i64, day: u32) -> Order {
		Order { id, user_id, order_date: at(day), status: OrderStatus::Pending }
	}

	fn review(id: i64, product_id: i64, user_id: i64, rating: i32) -> Review {
		Review {
			id,
			product_id,
			user_id,
			rating,
			comment: "Fine.".to_string(),
			created_at: at(1),
		}
	}

	#[test]
	fn product_search_filters_on_term_price_and_stock() {
		let tables = MemoryTables {
			products: vec![
				product(1, "Black Laptop", 250.0, 3),
				product(2, "Black Laptop", 900.0, 3),
				product(3, "Black Laptop", 300.0, 0),
				product(4, "White Tablet", 300.0, 5)
			],
			..Default::default()
		};
		assert_eq!(tables.product_search(), 1);
	}

	#[test]
	fn rating_needs_minimum_review_count() {
		let mut reviews: Vec<Review> = (1..=5).map(|id| review(id, 1, id, 4)).collect();
		reviews.extend((6..=9).map(|id| review(id, 2, id, 5)));
		let tables = MemoryTables {
			products: vec![product(1, "A", 10.0, 1), product(2, "B", 10.0, 1)],
			reviews,
			..Default::default()
		};
		assert_eq!(tables.avg_product_rating(), 1);
	}

	#[test]
	fn co_purchases_count_distinct_pairs() {
		let tables = MemoryTables {
			orders: vec![order(1, 1, 1), order(2, 1, 2)],
			order_items: vec![item(1, 1, 10), item(2, 1, 11), item(3, 1, 12), item(4, 2, 10), item(5, 2, 11)],
			..Default::default()
		};
		// (10,11) (10,12) (11,12)
		assert_eq!(tables.product_recommendations(), 3);
	}

	#[test]
	fn verified_purchases_join_reviews_to_orders() {
		let tables = MemoryTables {
			orders: vec![order(1, 7, 1)],
			order_items: vec![item(1, 1, 3)],
			reviews: vec![review(1, 3, 7, 5), review(2, 3, 8, 1), review(3, 4, 7, 2)],
			..Default::default()
		};
		assert_eq!(tables.verified_purchases(), 1);
	}

	#[test]
	fn sales_dashboard_only_counts_recent_days() {
		let tables = MemoryTables {
			orders: vec![order(1, 1, 1), order(2, 1, 20), order(3, 1, 25)],
			order_items: vec![item(1, 1, 1), item(2, 2, 1), item(3, 3, 1), item(4, 3, 2)],
			..Default::default()
		};
		assert_eq!(tables.sales_dashboard(at(30)), 2);
	}

	#[test]
	fn nested_and_flat_orders_agree() {
		let dataset: Dataset = generate_dataset(60, &mut StdRng::seed_from_u64(17));
		let flat = MemoryTables {
			users: dataset.users.clone(),
			products: dataset.products.clone(),
			orders: dataset.orders.clone(),
			order_items: dataset.order_items.clone(),
			reviews: dataset.reviews.clone(),
			..Default::default()
		};
		let nested = MemoryTables {
			users: dataset.users.clone(),
			products: dataset.products.clone(),
			nested_orders: nest_order_items(&dataset.orders, &dataset.order_items),
			reviews: dataset.reviews.clone(),
			..Default::default()
		};

		assert_eq!(flat.popular_products(), nested.popular_products());
		assert_eq!(flat.customer_spending(), nested.customer_spending());
		assert_eq!(flat.product_recommendations(), nested.product_recommendations());
		assert_eq!(flat.verified_purchases(), nested.verified_purchases());
	}

	#[tokio::test]
	async fn relational_delete_removes_every_match() {
		let db = MemoryBenchmark::new(DataModel::Relational);
		let orders = vec![order(1, 5, 1), order(2, 5, 2), order(3, 6, 3)];
		db.insert_many(InsertBatch::Orders(&orders)).await.unwrap();

		let removed = db.delete_by(Entity::Orders, "user_id", &FieldValue::Int(5)).await.unwrap();
		assert_eq!(removed, 2);
		assert_eq!(db.count(Entity::Orders).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn document_delete_removes_first_match() {
		let db = MemoryBenchmark::new(DataModel::Document);
		let orders = vec![order(1, 5, 1), order(2, 5, 2)];
		let nested = nest_order_items(&orders, &[item(1, 1, 9)]);
		db.insert_many(InsertBatch::NestedOrders(&nested)).await.unwrap();

		assert_eq!(db.count(Entity::OrderItems).await.unwrap(), 1);
		let removed = db.delete_by(Entity::Orders, "user_id", &FieldValue::Int(5)).await.unwrap();
		assert_eq!(removed, 1);
		assert_eq!(db.count(Entity::Orders).await.unwrap(), 1);
		assert_eq!(db.count(Entity::OrderItems).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn updates_apply_benchmark_mutations() {
		let db = MemoryBenchmark::new(DataModel::Relational);
		let products = vec![product(1, "Teal Monitor", 50.0, 4)];
		let reviews = vec![review(1, 1, 1, 2)];
		db.insert_many(InsertBatch::Products(&products)).await.unwrap();
		db.insert_many(InsertBatch::Reviews(&reviews)).await.unwrap();

		db.update_by(Entity::Products, "name", &FieldValue::from("Teal Monitor")).await.unwrap();
		db.update_by(Entity::Reviews, "id", &FieldValue::Int(1)).await.unwrap();

		let tables = db.snapshot().await;
		assert_eq!(tables.products[0].stock, 5);
		assert_eq!(tables.reviews[0].rating, 5);
	}

	#[tokio::test]
	async fn unknown_fields_and_failing_entities_error() {
		let db = MemoryBenchmark::new(DataModel::Relational).failing_on(Entity::Reviews);
		assert!(db.find_by(Entity::Users, "nickname", &FieldValue::Int(1)).await.is_err());
		assert!(db.find_by(Entity::Reviews, "id", &FieldValue::Int(1)).await.is_err());
		assert_eq!(db.find_by(Entity::Users, "id", &FieldValue::Int(1)).await.unwrap(), 0);
	}
}
