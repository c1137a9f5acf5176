pub mod benchmark;
pub mod config;
pub mod dataset;
pub mod error;
pub mod generator;
pub mod memory;
pub mod models;
pub mod recorder;
pub mod runner;
pub mod sampler;
pub mod timing;

/// Install the default `tracing` subscriber for a binary.
pub fn init_tracing() {
	tracing_subscriber::fmt::init();
}
