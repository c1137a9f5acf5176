//! Synthetic e-commerce data
//!
//! Produces `count` users, products, orders and reviews plus one to five
//! items per order. Every foreign key is drawn from ids generated earlier in
//! the same run, so the tables are referentially consistent by construction.

use std::fs;
use std::path::Path;

use chrono::{ Datelike, Duration, Local, NaiveDate, NaiveDateTime };
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::error::{ HarnessError, Result };
use crate::models::{
	Dataset,
	Order,
	OrderItem,
	OrderStatus,
	Product,
	Record,
	Review,
	User,
};

pub const DEFAULT_RECORD_COUNT: usize = 1000;

pub const PRICE_MIN: f64 = 10.0;
pub const PRICE_MAX: f64 = 5000.0;
pub const MAX_ITEMS_PER_ORDER: usize = 5;

const FIRST_NAMES: &[&str] = &[
	"Anna",
	"Maria",
	"Katarzyna",
	"Małgorzata",
	"Agnieszka",
	"Barbara",
	"Ewa",
	"Zofia",
	"Piotr",
	"Krzysztof",
	"Andrzej",
	"Tomasz",
	"Paweł",
	"Michał",
	"Marcin",
	"Jakub",
];

const LAST_NAMES: &[&str] = &[
	"Nowak",
	"Kowalski",
	"Wiśniewski",
	"Wójcik",
	"Kowalczyk",
	"Kamiński",
	"Lewandowski",
	"Zieliński",
	"Szymański",
	"Woźniak",
	"Dąbrowski",
	"Kozłowski",
	"Jankowski",
	"Mazur",
];

const COLOURS: &[&str] = &[
	"Black",
	"White",
	"Silver",
	"Navy",
	"Crimson",
	"Olive",
	"Teal",
	"Coral",
	"Indigo",
	"Ivory",
	"Maroon",
	"Turquoise",
];

const PRODUCT_KINDS: &[&str] = &["Laptop", "Telefon", "Monitor", "Tablet", "Kamera"];

const WORDS: &[&str] = &[
	"fast",
	"light",
	"durable",
	"screen",
	"battery",
	"laptop",
	"design",
	"quality",
	"price",
	"delivery",
	"camera",
	"sound",
	"great",
	"solid",
	"modern",
	"compact",
	"warranty",
	"value",
	"works",
	"recommend",
];

/// Inclusive window timestamps are drawn from: the current calendar year up to now.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
	pub start: NaiveDateTime,
	pub end: NaiveDateTime,
}

impl TimeWindow {
	pub fn this_year() -> Self {
		let end = Local::now().naive_local();
		let start = NaiveDate::from_ymd_opt(end.year(), 1, 1)
			.and_then(|date| date.and_hms_opt(0, 0, 0))
			.unwrap_or(end);
		TimeWindow { start, end }
	}

	pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> NaiveDateTime {
		let span = (self.end - self.start).num_seconds().max(0);
		self.start + Duration::seconds(rng.gen_range(0..=span))
	}
}

/// Generate a complete dataset with `count` records per category.
pub fn generate_dataset<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Dataset {
	let window = TimeWindow::this_year();

	let users = generate_users(count, &window, rng);
	let products = generate_products(count, rng);

	let user_ids: Vec<i64> = users
		.iter()
		.map(|u| u.id)
		.collect();
	let product_ids: Vec<i64> = products
		.iter()
		.map(|p| p.id)
		.collect();

	let (orders, order_items) = generate_orders(count, &user_ids, &product_ids, &window, rng);
	let reviews = generate_reviews(count, &user_ids, &product_ids, &window, rng);

	Dataset {
		users,
		products,
		orders,
		order_items,
		reviews,
	}
}

pub fn generate_users<R: Rng + ?Sized>(count: usize, window: &TimeWindow, rng: &mut R) -> Vec<User> {
	(1..=count as i64)
		.map(|id| User {
			id,
			first_name: pick(FIRST_NAMES, rng).to_string(),
			last_name: pick(LAST_NAMES, rng).to_string(),
			email: format!("user{}@example.com", id),
			password: (0..12).map(|_| rng.sample(Alphanumeric) as char).collect(),
			registration_date: window.sample(rng),
		})
		.collect()
}

pub fn generate_products<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Product> {
	(1..=count as i64)
		.map(|id| Product {
			id,
			name: format!("{} {}", pick(COLOURS, rng), pick(PRODUCT_KINDS, rng)),
			description: sentence(6, rng),
			price: random_price(rng),
			stock: rng.gen_range(1..=100),
		})
		.collect()
}

/// Orders and their items. Item ids are sequential across all orders.
pub fn generate_orders<R: Rng + ?Sized>(
	count: usize,
	user_ids: &[i64],
	product_ids: &[i64],
	window: &TimeWindow,
	rng: &mut R
) -> (Vec<Order>, Vec<OrderItem>) {
	let mut orders = Vec::with_capacity(count);
	let mut order_items = Vec::with_capacity(count * 3);

	if user_ids.is_empty() || product_ids.is_empty() {
		return (orders, order_items);
	}

	for order_id in 1..=count as i64 {
		orders.push(Order {
			id: order_id,
			user_id: *pick(user_ids, rng),
			order_date: window.sample(rng),
			status: *pick(&OrderStatus::ALL, rng),
		});

		for _ in 0..rng.gen_range(1..=MAX_ITEMS_PER_ORDER) {
			order_items.push(OrderItem {
				id: (order_items.len() as i64) + 1,
				order_id,
				product_id: *pick(product_ids, rng),
				quantity: rng.gen_range(1..=3),
				price: random_price(rng),
			});
		}
	}

	(orders, order_items)
}

pub fn generate_reviews<R: Rng + ?Sized>(
	count: usize,
	user_ids: &[i64],
	product_ids: &[i64],
	window: &TimeWindow,
	rng: &mut R
) -> Vec<Review> {
	if user_ids.is_empty() || product_ids.is_empty() {
		return Vec::new();
	}

	(1..=count as i64)
		.map(|id| Review {
			id,
			product_id: *pick(product_ids, rng),
			user_id: *pick(user_ids, rng),
			rating: rng.gen_range(1..=5),
			comment: sentence(rng.gen_range(4..=10), rng),
			created_at: window.sample(rng),
		})
		.collect()
}

/// Write each table as `<table>.csv` under `dir`, header first.
pub fn write_dataset(dataset: &Dataset, dir: &Path) -> Result<()> {
	fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;

	write_table(dir, &dataset.users)?;
	write_table(dir, &dataset.products)?;
	write_table(dir, &dataset.orders)?;
	write_table(dir, &dataset.order_items)?;
	write_table(dir, &dataset.reviews)?;

	Ok(())
}

/// Generate `count` records per category and write them to `dir`.
pub fn generate_to_dir(count: usize, dir: &Path) -> Result<Dataset> {
	info!("Generating {} records per category", count);
	let dataset = generate_dataset(count, &mut rand::thread_rng());
	write_dataset(&dataset, dir)?;
	info!(
		"Wrote {} users, {} products, {} orders, {} order items, {} reviews to {}",
		dataset.users.len(),
		dataset.products.len(),
		dataset.orders.len(),
		dataset.order_items.len(),
		dataset.reviews.len(),
		dir.display()
	);
	Ok(dataset)
}

fn write_table<T: Record + Serialize>(dir: &Path, rows: &[T]) -> Result<()> {
	let path = dir.join(T::ENTITY.file_name());

	// Header goes out explicitly so empty tables still get one.
	let mut writer = csv::WriterBuilder
		::new()
		.has_headers(false)
		.from_path(&path)
		.map_err(|e| HarnessError::csv(&path, e))?;

	writer.write_record(T::FIELDS).map_err(|e| HarnessError::csv(&path, e))?;
	for row in rows {
		writer.serialize(row).map_err(|e| HarnessError::csv(&path, e))?;
	}
	writer.flush().map_err(|e| HarnessError::io(&path, e))?;

	Ok(())
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
	// Callers never pass an empty slice.
	&items[rng.gen_range(0..items.len())]
}

fn random_price<R: Rng + ?Sized>(rng: &mut R) -> f64 {
	(rng.gen_range(PRICE_MIN..=PRICE_MAX) * 100.0).round() / 100.0
}

fn sentence<R: Rng + ?Sized>(words: usize, rng: &mut R) -> String {
	let mut chosen: Vec<&str> = WORDS.choose_multiple(rng, words.min(WORDS.len())).copied().collect();
	chosen.shuffle(rng);

	let mut text = chosen.join(" ");
	if let Some(first) = text.get_mut(0..1) {
		first.make_ascii_uppercase();
	}
	text.push('.');
	text
}
