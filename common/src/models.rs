use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{ Deserialize, Serialize };

use crate::error::{ HarnessError, Result };

/// Timestamp layout used in the generated files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One row of a tabular file, keyed by header name.
pub type RawRecord = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
	Users,
	Products,
	Orders,
	OrderItems,
	Reviews,
}

impl Entity {
	/// Dependency order: parents before the tables that reference them.
	pub const ALL: [Entity; 5] = [
		Entity::Users,
		Entity::Products,
		Entity::Orders,
		Entity::OrderItems,
		Entity::Reviews,
	];

	pub fn table_name(&self) -> &'static str {
		match self {
			Entity::Users => "users",
			Entity::Products => "products",
			Entity::Orders => "orders",
			Entity::OrderItems => "order_items",
			Entity::Reviews => "reviews",
		}
	}

	pub fn file_name(&self) -> String {
		format!("{}.csv", self.table_name())
	}

	pub fn fields(&self) -> &'static [&'static str] {
		match self {
			Entity::Users => User::FIELDS,
			Entity::Products => Product::FIELDS,
			Entity::Orders => Order::FIELDS,
			Entity::OrderItems => OrderItem::FIELDS,
			Entity::Reviews => Review::FIELDS,
		}
	}

	pub fn has_field(&self, field: &str) -> bool {
		self.fields().contains(&field)
	}
}

impl fmt::Display for Entity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.table_name())
	}
}

impl FromStr for Entity {
	type Err = HarnessError;

	fn from_str(s: &str) -> Result<Self> {
		Entity::ALL.into_iter()
			.find(|entity| entity.table_name() == s)
			.ok_or_else(|| HarnessError::UnknownEntity(s.to_string()))
	}
}

/// How a target stores orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataModel {
	/// Separate `orders` and `order_items` tables.
	Relational,
	/// Order items embedded in their parent order document.
	Document,
}

/// A single field value pulled out of a record for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
	Int(i64),
	Text(String),
}

impl fmt::Display for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FieldValue::Int(value) => write!(f, "{}", value),
			FieldValue::Text(value) => f.write_str(value),
		}
	}
}

impl From<i64> for FieldValue {
	fn from(value: i64) -> Self {
		FieldValue::Int(value)
	}
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Text(value.to_string())
	}
}

/// Field-level access shared by every generated entity.
pub trait Record {
	const ENTITY: Entity;
	/// Field names in insertion order; also the header of the tabular file.
	const FIELDS: &'static [&'static str];

	fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Explicit coercion from the untyped loader output.
pub trait FromRawRecord: Record + Sized {
	fn from_raw(raw: &RawRecord) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	Pending,
	Shipped,
	Cancelled,
	Completed,
}

impl OrderStatus {
	pub const ALL: [OrderStatus; 4] = [
		OrderStatus::Pending,
		OrderStatus::Shipped,
		OrderStatus::Cancelled,
		OrderStatus::Completed,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "Pending",
			OrderStatus::Shipped => "Shipped",
			OrderStatus::Cancelled => "Cancelled",
			OrderStatus::Completed => "Completed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		OrderStatus::ALL.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| "expected one of Pending, Shipped, Cancelled, Completed".to_string())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub id: i64,
	pub first_name: String,
	pub last_name: String,
	pub email: String,
	pub password: String,
	#[serde(with = "iso_timestamp")]
	pub registration_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
	pub id: i64,
	pub name: String,
	pub description: String,
	pub price: f64,
	pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	pub id: i64,
	pub user_id: i64,
	#[serde(with = "iso_timestamp")]
	pub order_date: NaiveDateTime,
	pub status: OrderStatus,
}

/// Line of an order. `price` is drawn independently of the product's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
	pub id: i64,
	pub order_id: i64,
	pub product_id: i64,
	pub quantity: i32,
	pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
	pub id: i64,
	pub product_id: i64,
	pub user_id: i64,
	pub rating: i32,
	pub comment: String,
	#[serde(with = "iso_timestamp")]
	pub created_at: NaiveDateTime,
}

/// Order item as embedded in a document-model order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedItem {
	pub product_id: i64,
	pub quantity: i32,
	pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedOrder {
	pub id: i64,
	pub user_id: i64,
	#[serde(with = "iso_timestamp")]
	pub order_date: NaiveDateTime,
	pub status: OrderStatus,
	pub items: Vec<NestedItem>,
}

/// Every generated table, held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
	pub users: Vec<User>,
	pub products: Vec<Product>,
	pub orders: Vec<Order>,
	pub order_items: Vec<OrderItem>,
	pub reviews: Vec<Review>,
}

impl Dataset {
	pub fn len_of(&self, entity: Entity) -> usize {
		match entity {
			Entity::Users => self.users.len(),
			Entity::Products => self.products.len(),
			Entity::Orders => self.orders.len(),
			Entity::OrderItems => self.order_items.len(),
			Entity::Reviews => self.reviews.len(),
		}
	}
}

impl Record for User {
	const ENTITY: Entity = Entity::Users;
	const FIELDS: &'static [&'static str] = &[
		"id",
		"first_name",
		"last_name",
		"email",
		"password",
		"registration_date",
	];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"first_name" => Some(FieldValue::Text(self.first_name.clone())),
			"last_name" => Some(FieldValue::Text(self.last_name.clone())),
			"email" => Some(FieldValue::Text(self.email.clone())),
			"password" => Some(FieldValue::Text(self.password.clone())),
			"registration_date" => Some(FieldValue::Text(format_timestamp(&self.registration_date))),
			_ => None,
		}
	}
}

impl FromRawRecord for User {
	fn from_raw(raw: &RawRecord) -> Result<Self> {
		Ok(User {
			id: parse_field::<Self, _>(raw, "id")?,
			first_name: text_field::<Self>(raw, "first_name")?,
			last_name: text_field::<Self>(raw, "last_name")?,
			email: text_field::<Self>(raw, "email")?,
			password: text_field::<Self>(raw, "password")?,
			registration_date: timestamp_field::<Self>(raw, "registration_date")?,
		})
	}
}

impl Record for Product {
	const ENTITY: Entity = Entity::Products;
	const FIELDS: &'static [&'static str] = &["id", "name", "description", "price", "stock"];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"name" => Some(FieldValue::Text(self.name.clone())),
			"description" => Some(FieldValue::Text(self.description.clone())),
			"price" => Some(FieldValue::Text(format!("{:.2}", self.price))),
			"stock" => Some(FieldValue::Int(self.stock.into())),
			_ => None,
		}
	}
}

impl FromRawRecord for Product {
	fn from_raw(raw: &RawRecord) -> Result<Self> {
		Ok(Product {
			id: parse_field::<Self, _>(raw, "id")?,
			name: text_field::<Self>(raw, "name")?,
			description: text_field::<Self>(raw, "description")?,
			price: parse_field::<Self, _>(raw, "price")?,
			stock: parse_field::<Self, _>(raw, "stock")?,
		})
	}
}

impl Record for Order {
	const ENTITY: Entity = Entity::Orders;
	const FIELDS: &'static [&'static str] = &["id", "user_id", "order_date", "status"];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"user_id" => Some(FieldValue::Int(self.user_id)),
			"order_date" => Some(FieldValue::Text(format_timestamp(&self.order_date))),
			"status" => Some(FieldValue::Text(self.status.to_string())),
			_ => None,
		}
	}
}

impl FromRawRecord for Order {
	fn from_raw(raw: &RawRecord) -> Result<Self> {
		Ok(Order {
			id: parse_field::<Self, _>(raw, "id")?,
			user_id: parse_field::<Self, _>(raw, "user_id")?,
			order_date: timestamp_field::<Self>(raw, "order_date")?,
			status: parse_field::<Self, _>(raw, "status")?,
		})
	}
}

impl Record for OrderItem {
	const ENTITY: Entity = Entity::OrderItems;
	const FIELDS: &'static [&'static str] = &["id", "order_id", "product_id", "quantity", "price"];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"order_id" => Some(FieldValue::Int(self.order_id)),
			"product_id" => Some(FieldValue::Int(self.product_id)),
			"quantity" => Some(FieldValue::Int(self.quantity.into())),
			"price" => Some(FieldValue::Text(format!("{:.2}", self.price))),
			_ => None,
		}
	}
}

impl FromRawRecord for OrderItem {
	fn from_raw(raw: &RawRecord) -> Result<Self> {
		Ok(OrderItem {
			id: parse_field::<Self, _>(raw, "id")?,
			order_id: parse_field::<Self, _>(raw, "order_id")?,
			product_id: parse_field::<Self, _>(raw, "product_id")?,
			quantity: parse_field::<Self, _>(raw, "quantity")?,
			price: parse_field::<Self, _>(raw, "price")?,
		})
	}
}

impl Record for Review {
	const ENTITY: Entity = Entity::Reviews;
	const FIELDS: &'static [&'static str] = &[
		"id",
		"product_id",
		"user_id",
		"rating",
		"comment",
		"created_at",
	];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"product_id" => Some(FieldValue::Int(self.product_id)),
			"user_id" => Some(FieldValue::Int(self.user_id)),
			"rating" => Some(FieldValue::Int(self.rating.into())),
			"comment" => Some(FieldValue::Text(self.comment.clone())),
			"created_at" => Some(FieldValue::Text(format_timestamp(&self.created_at))),
			_ => None,
		}
	}
}

impl FromRawRecord for Review {
	fn from_raw(raw: &RawRecord) -> Result<Self> {
		Ok(Review {
			id: parse_field::<Self, _>(raw, "id")?,
			product_id: parse_field::<Self, _>(raw, "product_id")?,
			user_id: parse_field::<Self, _>(raw, "user_id")?,
			rating: parse_field::<Self, _>(raw, "rating")?,
			comment: text_field::<Self>(raw, "comment")?,
			created_at: timestamp_field::<Self>(raw, "created_at")?,
		})
	}
}

// Nested orders sample by the same keys as flat orders.
impl Record for NestedOrder {
	const ENTITY: Entity = Entity::Orders;
	const FIELDS: &'static [&'static str] = &["id", "user_id", "order_date", "status", "items"];

	fn field(&self, name: &str) -> Option<FieldValue> {
		match name {
			"id" => Some(FieldValue::Int(self.id)),
			"user_id" => Some(FieldValue::Int(self.user_id)),
			"order_date" => Some(FieldValue::Text(format_timestamp(&self.order_date))),
			"status" => Some(FieldValue::Text(self.status.to_string())),
			_ => None,
		}
	}
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
	value.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the generated `T` layout, optional fractional seconds, and the
/// space-separated layout relational stores hand back.
pub fn parse_timestamp(value: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
	NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").or_else(|_| {
		NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
	})
}

fn raw_field<'a, R: Record>(raw: &'a RawRecord, field: &str) -> Result<&'a str> {
	raw.get(field)
		.map(String::as_str)
		.ok_or_else(|| HarnessError::MissingField {
			entity: R::ENTITY,
			field: field.to_string(),
		})
}

fn text_field<R: Record>(raw: &RawRecord, field: &str) -> Result<String> {
	raw_field::<R>(raw, field).map(str::to_string)
}

fn parse_field<R, T>(raw: &RawRecord, field: &str) -> Result<T>
	where R: Record, T: FromStr, T::Err: fmt::Display
{
	let value = raw_field::<R>(raw, field)?;
	value.trim().parse::<T>().map_err(|e| HarnessError::Coercion {
		entity: R::ENTITY,
		field: field.to_string(),
		value: value.to_string(),
		reason: e.to_string(),
	})
}

fn timestamp_field<R: Record>(raw: &RawRecord, field: &str) -> Result<NaiveDateTime> {
	let value = raw_field::<R>(raw, field)?;
	parse_timestamp(value.trim()).map_err(|e| HarnessError::Coercion {
		entity: R::ENTITY,
		field: field.to_string(),
		value: value.to_string(),
		reason: e.to_string(),
	})
}

mod iso_timestamp {
	use chrono::NaiveDateTime;
	use serde::{ de::Error, Deserialize, Deserializer, Serializer };

	pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&super::format_timestamp(value))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
		let value = String::deserialize(deserializer)?;
		super::parse_timestamp(&value).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw(pairs: &[(&str, &str)]) -> RawRecord {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn coerces_order_from_raw_strings() {
		let order = Order::from_raw(
			&raw(
				&[
					("id", "7"),
					("user_id", "3"),
					("order_date", "2024-05-01T10:11:12"),
					("status", "Shipped"),
				]
			)
		).unwrap();

		assert_eq!(order.id, 7);
		assert_eq!(order.user_id, 3);
		assert_eq!(order.status, OrderStatus::Shipped);
		assert_eq!(format_timestamp(&order.order_date), "2024-05-01T10:11:12");
	}

	#[test]
	fn coercion_reports_field_and_value() {
		let err = OrderItem::from_raw(
			&raw(
				&[
					("id", "1"),
					("order_id", "x"),
					("product_id", "2"),
					("quantity", "1"),
					("price", "9.99"),
				]
			)
		).unwrap_err();

		match err {
			HarnessError::Coercion { entity, field, value, .. } => {
				assert_eq!(entity, Entity::OrderItems);
				assert_eq!(field, "order_id");
				assert_eq!(value, "x");
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn missing_field_is_reported() {
		let err = Product::from_raw(&raw(&[("id", "1")])).unwrap_err();
		assert!(matches!(err, HarnessError::MissingField { entity: Entity::Products, .. }));
	}

	#[test]
	fn parses_fractional_and_space_separated_timestamps() {
		assert!(parse_timestamp("2024-01-02T03:04:05.123456").is_ok());
		assert!(parse_timestamp("2024-01-02 03:04:05").is_ok());
		assert!(parse_timestamp("yesterday").is_err());
	}

	#[test]
	fn entity_names_round_trip() {
		for entity in Entity::ALL {
			assert_eq!(entity.table_name().parse::<Entity>().unwrap(), entity);
		}
		assert!("carts".parse::<Entity>().is_err());
	}
}
