use std::sync::Arc;

use anyhow::{ bail, Result };
use async_trait::async_trait;
use chrono::{ Local, NaiveDateTime };
use common::{
	benchmark::{
		AnalyticalQuery,
		DatabaseBenchmark,
		InsertBatch,
		MIN_REVIEWS_FOR_RATING,
		SALES_WINDOW_DAYS,
		SEARCH_PRICE_RANGE,
		SEARCH_TERM,
		VERIFIED_PURCHASES_LIMIT,
	},
	config::env_or,
	error::HarnessError,
	models::{ DataModel, Entity, FieldValue },
};
use mysql_async::{ prelude::*, Conn, OptsBuilder, Row, Value };
use tokio::sync::Mutex;
use tracing::{ debug, info };

const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

// Dependents first; foreign key checks are off while clearing anyway.
const CLEAR_ORDER: [Entity; 5] = [
	Entity::OrderItems,
	Entity::Reviews,
	Entity::Orders,
	Entity::Products,
	Entity::Users,
];

const SCHEMA: [&str; 5] = [
	"CREATE TABLE IF NOT EXISTS users (
		id BIGINT PRIMARY KEY,
		first_name VARCHAR(100) NOT NULL,
		last_name VARCHAR(100) NOT NULL,
		email VARCHAR(255) NOT NULL,
		password VARCHAR(255) NOT NULL,
		registration_date DATETIME NOT NULL,
		INDEX idx_users_email (email)
	)",
	"CREATE TABLE IF NOT EXISTS products (
		id BIGINT PRIMARY KEY,
		name VARCHAR(255) NOT NULL,
		description TEXT NOT NULL,
		price DECIMAL(10, 2) NOT NULL,
		stock INT NOT NULL,
		INDEX idx_products_name (name)
	)",
	"CREATE TABLE IF NOT EXISTS orders (
		id BIGINT PRIMARY KEY,
		user_id BIGINT NOT NULL,
		order_date DATETIME NOT NULL,
		status VARCHAR(20) NOT NULL,
		FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
	)",
	"CREATE TABLE IF NOT EXISTS order_items (
		id BIGINT PRIMARY KEY,
		order_id BIGINT NOT NULL,
		product_id BIGINT NOT NULL,
		quantity INT NOT NULL,
		price DECIMAL(10, 2) NOT NULL,
		FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE,
		FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
	)",
	"CREATE TABLE IF NOT EXISTS reviews (
		id BIGINT PRIMARY KEY,
		product_id BIGINT NOT NULL,
		user_id BIGINT NOT NULL,
		rating INT NOT NULL,
		comment TEXT NOT NULL,
		created_at DATETIME NOT NULL,
		FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE,
		FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
	)",
];

/// Connection settings, overridable through `MYSQL_*` variables.
#[derive(Debug, Clone)]
pub struct MysqlSettings {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub password: String,
	pub database: String,
}

impl MysqlSettings {
	pub fn from_env() -> Result<Self, HarnessError> {
		Ok(MysqlSettings {
			host: env_or("MYSQL_HOST", "localhost".to_string())?,
			port: env_or("MYSQL_PORT", 3308)?,
			user: env_or("MYSQL_USER", "admin".to_string())?,
			password: env_or("MYSQL_PASSWORD", "admin123".to_string())?,
			database: env_or("MYSQL_DATABASE", "shop".to_string())?,
		})
	}
}

pub struct MysqlBenchmark {
	conn: Arc<Mutex<Conn>>,
}

impl MysqlBenchmark {
	pub async fn connect(settings: &MysqlSettings) -> Result<Self> {
		let opts = OptsBuilder::default()
			.ip_or_hostname(settings.host.clone())
			.tcp_port(settings.port)
			.user(Some(settings.user.clone()))
			.pass(Some(settings.password.clone()))
			.db_name(Some(settings.database.clone()));

		let conn = Conn::new(opts).await?;
		info!("Connected to MySQL at {}:{}/{}", settings.host, settings.port, settings.database);

		Ok(Self { conn: Arc::new(Mutex::new(conn)) })
	}
}

fn sql_timestamp(value: &NaiveDateTime) -> String {
	value.format(SQL_DATETIME).to_string()
}

fn to_param(value: &FieldValue) -> Value {
	match value {
		FieldValue::Int(v) => Value::Int(*v),
		FieldValue::Text(v) => Value::Bytes(v.as_bytes().to_vec()),
	}
}

// Field names end up in SQL text, so only known columns get through.
fn checked_field(entity: Entity, field: &str) -> Result<()> {
	if entity.has_field(field) {
		Ok(())
	} else {
		Err((HarnessError::UnknownField { entity, field: field.to_string() }).into())
	}
}

pub fn insert_sql(entity: Entity) -> String {
	let fields = entity.fields();
	let placeholders = vec!["?"; fields.len()].join(", ");
	format!("INSERT INTO {} ({}) VALUES ({})", entity.table_name(), fields.join(", "), placeholders)
}

pub fn select_sql(entity: Entity, field: &str) -> String {
	format!("SELECT * FROM {} WHERE {} = ?", entity.table_name(), field)
}

pub fn delete_sql(entity: Entity, field: &str) -> String {
	format!("DELETE FROM {} WHERE {} = ?", entity.table_name(), field)
}

/// The mutation applied by `update_by`; users also take a timestamp parameter.
pub fn update_sql(entity: Entity, field: &str) -> Result<String> {
	let set = match entity {
		Entity::Users => "registration_date = ?",
		Entity::Products => "stock = stock + 1",
		Entity::Orders => "status = 'Completed'",
		Entity::Reviews => "rating = 5",
		Entity::OrderItems => bail!("no benchmark update is defined for order_items"),
	};
	Ok(format!("UPDATE {} SET {} WHERE {} = ?", entity.table_name(), set, field))
}

pub fn analytical_sql(query: AnalyticalQuery) -> String {
	match query {
		AnalyticalQuery::PopularProducts =>
			"SELECT p.id, p.name, COUNT(oi.product_id) AS order_count
			FROM products p
			JOIN order_items oi ON p.id = oi.product_id
			GROUP BY p.id, p.name
			ORDER BY order_count DESC
			LIMIT 10".to_string(),
		AnalyticalQuery::AvgProductRating =>
			format!(
				"SELECT p.id, p.name, AVG(r.rating) AS avg_rating, COUNT(r.id) AS review_count
				FROM products p
				JOIN reviews r ON p.id = r.product_id
				GROUP BY p.id, p.name
				HAVING COUNT(r.id) >= {}
				ORDER BY avg_rating DESC
				LIMIT 10",
				MIN_REVIEWS_FOR_RATING
			),
		AnalyticalQuery::CustomerSpending =>
			"SELECT u.id, u.email, SUM(oi.price * oi.quantity) AS total_spent
			FROM users u
			JOIN orders o ON u.id = o.user_id
			JOIN order_items oi ON o.id = oi.order_id
			GROUP BY u.id, u.email
			ORDER BY total_spent DESC
			LIMIT 20".to_string(),
		AnalyticalQuery::ProductSearch => {
			let (low, high) = SEARCH_PRICE_RANGE;
			format!(
				"SELECT p.id, p.name, p.price, p.stock
				FROM products p
				WHERE (p.name LIKE '%{term}%' OR p.description LIKE '%{term}%')
				AND p.price BETWEEN {low} AND {high}
				AND p.stock > 0
				ORDER BY p.price ASC",
				term = SEARCH_TERM,
				low = low,
				high = high
			)
		}
		AnalyticalQuery::SalesDashboard =>
			format!(
				"SELECT DATE(o.order_date) AS day, COUNT(o.id) AS orders, SUM(oi.price * oi.quantity) AS revenue
				FROM orders o
				JOIN order_items oi ON o.id = oi.order_id
				WHERE o.order_date >= DATE_SUB(NOW(), INTERVAL {} DAY)
				GROUP BY DATE(o.order_date)
				ORDER BY day DESC",
				SALES_WINDOW_DAYS
			),
		AnalyticalQuery::ProductRecommendations =>
			"SELECT oi1.product_id AS product_a, oi2.product_id AS product_b, COUNT(*) AS times_bought_together
			FROM order_items oi1
			JOIN order_items oi2 ON oi1.order_id = oi2.order_id AND oi1.product_id < oi2.product_id
			GROUP BY oi1.product_id, oi2.product_id
			ORDER BY times_bought_together DESC
			LIMIT 10".to_string(),
		AnalyticalQuery::VerifiedPurchases =>
			format!(
				"SELECT r.id, r.product_id, r.user_id, r.rating
				FROM reviews r
				WHERE EXISTS (
					SELECT 1 FROM orders o
					JOIN order_items oi ON o.id = oi.order_id
					WHERE o.user_id = r.user_id AND oi.product_id = r.product_id
				)
				LIMIT {}",
				VERIFIED_PURCHASES_LIMIT
			),
	}
}

#[async_trait]
impl DatabaseBenchmark for MysqlBenchmark {
	fn database_name(&self) -> String {
		"mysql".to_string()
	}

	fn data_model(&self) -> DataModel {
		DataModel::Relational
	}

	async fn init(&self) -> Result<()> {
		let mut conn = self.conn.lock().await;
		for statement in SCHEMA {
			conn.query_drop(statement).await?;
		}
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		let mut conn = self.conn.lock().await;
		conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;
		for entity in CLEAR_ORDER {
			conn.query_drop(format!("DELETE FROM {}", entity.table_name())).await?;
		}
		conn.query_drop("SET FOREIGN_KEY_CHECKS = 1").await?;
		Ok(())
	}

	async fn insert_many(&self, batch: InsertBatch<'_>) -> Result<()> {
		let sql = insert_sql(batch.entity());
		let mut conn = self.conn.lock().await;

		match batch {
			InsertBatch::Users(rows) => {
				conn.exec_batch(
					sql,
					rows.iter().map(|u| (
						u.id,
						u.first_name.clone(),
						u.last_name.clone(),
						u.email.clone(),
						u.password.clone(),
						sql_timestamp(&u.registration_date),
					))
				).await?;
			}
			InsertBatch::Products(rows) => {
				conn.exec_batch(
					sql,
					rows.iter().map(|p| (p.id, p.name.clone(), p.description.clone(), p.price, p.stock))
				).await?;
			}
			InsertBatch::Orders(rows) => {
				conn.exec_batch(
					sql,
					rows.iter().map(|o| (o.id, o.user_id, sql_timestamp(&o.order_date), o.status.to_string()))
				).await?;
			}
			InsertBatch::OrderItems(rows) => {
				conn.exec_batch(
					sql,
					rows.iter().map(|i| (i.id, i.order_id, i.product_id, i.quantity, i.price))
				).await?;
			}
			InsertBatch::Reviews(rows) => {
				conn.exec_batch(
					sql,
					rows.iter().map(|r| (
						r.id,
						r.product_id,
						r.user_id,
						r.rating,
						r.comment.clone(),
						sql_timestamp(&r.created_at),
					))
				).await?;
			}
			InsertBatch::NestedOrders(_) => bail!("MySQL stores order items in their own table"),
		}
		Ok(())
	}

	async fn find_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<usize> {
		checked_field(entity, field)?;
		let mut conn = self.conn.lock().await;
		let rows: Vec<Row> = conn.exec(select_sql(entity, field), (to_param(value),)).await?;
		Ok(rows.len())
	}

	async fn update_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64> {
		checked_field(entity, field)?;
		let sql = update_sql(entity, field)?;
		let mut conn = self.conn.lock().await;
		if entity == Entity::Users {
			let now = sql_timestamp(&Local::now().naive_local());
			conn.exec_drop(sql, (now, to_param(value))).await?;
		} else {
			conn.exec_drop(sql, (to_param(value),)).await?;
		}
		Ok(conn.affected_rows())
	}

	async fn delete_by(&self, entity: Entity, field: &str, value: &FieldValue) -> Result<u64> {
		checked_field(entity, field)?;
		let mut conn = self.conn.lock().await;
		conn.exec_drop(delete_sql(entity, field), (to_param(value),)).await?;
		Ok(conn.affected_rows())
	}

	async fn run_analytical(&self, query: AnalyticalQuery) -> Result<usize> {
		let sql = analytical_sql(query);
		debug!("{}: {}", query.name(), sql);
		let mut conn = self.conn.lock().await;
		let rows: Vec<Row> = conn.query(sql).await?;
		Ok(rows.len())
	}

	async fn count(&self, entity: Entity) -> Result<u64> {
		let mut conn = self.conn.lock().await;
		let count: Option<u64> = conn.query_first(format!("SELECT COUNT(*) FROM {}", entity.table_name())).await?;
		Ok(count.unwrap_or(0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_lists_every_column() {
		assert_eq!(
			insert_sql(Entity::Orders),
			"INSERT INTO orders (id, user_id, order_date, status) VALUES (?, ?, ?, ?)"
		);
		assert_eq!(insert_sql(Entity::Users).matches('?').count(), 6);
	}

	#[test]
	fn update_statements_apply_entity_mutations() {
		assert_eq!(
			update_sql(Entity::Products, "name").unwrap(),
			"UPDATE products SET stock = stock + 1 WHERE name = ?"
		);
		assert_eq!(
			update_sql(Entity::Orders, "id").unwrap(),
			"UPDATE orders SET status = 'Completed' WHERE id = ?"
		);
		assert!(update_sql(Entity::Users, "email").unwrap().contains("registration_date = ?"));
		assert!(update_sql(Entity::OrderItems, "id").is_err());
	}

	#[test]
	fn unknown_columns_never_reach_sql() {
		assert!(checked_field(Entity::Users, "email").is_ok());
		assert!(checked_field(Entity::Users, "email; DROP TABLE users").is_err());
	}

	#[test]
	fn analytical_queries_carry_their_constants() {
		assert!(analytical_sql(AnalyticalQuery::AvgProductRating).contains("HAVING COUNT(r.id) >= 5"));
		assert!(analytical_sql(AnalyticalQuery::SalesDashboard).contains("INTERVAL 30 DAY"));
		assert!(analytical_sql(AnalyticalQuery::ProductSearch).contains("BETWEEN 100 AND 500"));
		assert!(analytical_sql(AnalyticalQuery::VerifiedPurchases).contains("WHERE EXISTS"));
		assert!(analytical_sql(AnalyticalQuery::VerifiedPurchases).ends_with("LIMIT 100"));
	}

	#[test]
	fn timestamps_use_mysql_layout() {
		let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(7, 5, 0).unwrap();
		assert_eq!(sql_timestamp(&at), "2024-03-09 07:05:00");
	}
}
