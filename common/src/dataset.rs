//! Loading generated tables back into memory
//!
//! Loading is split into two explicit steps: `RawDataset::load` reads every
//! row as a field-name to string mapping, and `RawDataset::coerce` turns those
//! strings into typed records. `nest_order_items` reshapes orders for
//! document stores.

use std::collections::HashMap;
use std::path::{ Path, PathBuf };

use tracing::{ debug, warn };

use crate::error::{ HarnessError, Result };
use crate::models::{
	Dataset,
	Entity,
	FromRawRecord,
	NestedItem,
	NestedOrder,
	Order,
	OrderItem,
	OrderStatus,
	Product,
	RawRecord,
	Review,
	User,
};

/// A tabular file as read from disk, without any type coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
	pub headers: Vec<String>,
	pub rows: Vec<RawRecord>,
}

impl RawTable {
	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn coerce<T: FromRawRecord>(&self) -> Result<Vec<T>> {
		self.rows.iter().map(T::from_raw).collect()
	}
}

pub fn load_raw_table(path: &Path) -> Result<RawTable> {
	let mut reader = csv::Reader::from_path(path).map_err(|e| HarnessError::csv(path, e))?;

	let headers: Vec<String> = reader
		.headers()
		.map_err(|e| HarnessError::csv(path, e))?
		.iter()
		.map(str::to_string)
		.collect();

	let mut rows = Vec::new();
	for record in reader.records() {
		let record = record.map_err(|e| HarnessError::csv(path, e))?;
		let row: RawRecord = headers
			.iter()
			.cloned()
			.zip(record.iter().map(str::to_string))
			.collect();
		rows.push(row);
	}

	debug!("Loaded {} rows from {}", rows.len(), path.display());
	Ok(RawTable { headers, rows })
}

/// The five generated tables in untyped form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
	pub users: RawTable,
	pub products: RawTable,
	pub orders: RawTable,
	pub order_items: RawTable,
	pub reviews: RawTable,
}

impl RawDataset {
	pub fn load(dir: &Path) -> Result<Self> {
		let table = |entity: Entity| -> Result<RawTable> {
			let path: PathBuf = dir.join(entity.file_name());
			load_raw_table(&path)
		};

		Ok(RawDataset {
			users: table(Entity::Users)?,
			products: table(Entity::Products)?,
			orders: table(Entity::Orders)?,
			order_items: table(Entity::OrderItems)?,
			reviews: table(Entity::Reviews)?,
		})
	}

	pub fn table(&self, entity: Entity) -> &RawTable {
		match entity {
			Entity::Users => &self.users,
			Entity::Products => &self.products,
			Entity::Orders => &self.orders,
			Entity::OrderItems => &self.order_items,
			Entity::Reviews => &self.reviews,
		}
	}

	/// Coerce id, integer, decimal, timestamp and status fields.
	pub fn coerce(&self) -> Result<Dataset> {
		Ok(Dataset {
			users: self.users.coerce::<User>()?,
			products: self.products.coerce::<Product>()?,
			orders: self.orders.coerce::<Order>()?,
			order_items: self.order_items.coerce::<OrderItem>()?,
			reviews: self.reviews.coerce::<Review>()?,
		})
	}
}

/// Load and coerce every table under `dir`.
pub fn load_dataset(dir: &Path) -> Result<Dataset> {
	let raw = RawDataset::load(dir)?;
	for entity in Entity::ALL {
		debug!("Read {} {} rows from {}", raw.table(entity).len(), entity, dir.display());
	}
	raw.coerce()
}

/// Embed each order's items into the order, keyed by `order_id`.
///
/// Pure: the inputs are untouched and the same inputs always give the same
/// output. Items keep their relative order. Items pointing at an order that
/// is not in `orders` cannot be attached and are skipped.
pub fn nest_order_items(orders: &[Order], items: &[OrderItem]) -> Vec<NestedOrder> {
	let mut items_by_order: HashMap<i64, Vec<NestedItem>> = HashMap::new();
	for item in items {
		items_by_order.entry(item.order_id).or_default().push(NestedItem {
			product_id: item.product_id,
			quantity: item.quantity,
			price: item.price,
		});
	}

	let nested: Vec<NestedOrder> = orders
		.iter()
		.map(|order| NestedOrder {
			id: order.id,
			user_id: order.user_id,
			order_date: order.order_date,
			status: order.status,
			items: items_by_order.remove(&order.id).unwrap_or_default(),
		})
		.collect();

	let orphans: usize = items_by_order.values().map(Vec::len).sum();
	if orphans > 0 {
		warn!("{} order items reference unknown orders and were not nested", orphans);
	}

	nested
}

/// Count of orders per status, used for load summaries.
pub fn status_histogram(orders: &[Order]) -> HashMap<OrderStatus, usize> {
	let mut histogram = HashMap::new();
	for order in orders {
		*histogram.entry(order.status).or_insert(0) += 1;
	}
	histogram
}
