//! Outer scale loop
//!
//! Regenerates the dataset at a growing size and runs every target against
//! it until one target takes longer than the ceiling.

use std::time::{ Duration, Instant };

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{ error, info, warn };

use crate::config::env_or;
use crate::error::HarnessError;

pub const DEFAULT_START_COUNT: usize = 100_000;
pub const DEFAULT_STEP: usize = 20_000;
pub const DEFAULT_CEILING: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
	pub start_count: usize,
	pub step: usize,
	pub ceiling: Duration,
	pub max_iterations: Option<usize>,
	pub targets: Vec<String>,
}

impl LoopConfig {
	pub fn new(targets: Vec<String>) -> Self {
		LoopConfig {
			start_count: DEFAULT_START_COUNT,
			step: DEFAULT_STEP,
			ceiling: DEFAULT_CEILING,
			max_iterations: None,
			targets,
		}
	}

	/// Overrides from `RUNNER_START`, `RUNNER_STEP`, `RUNNER_CEILING_SECS`
	/// and `RUNNER_MAX_ITERATIONS`.
	pub fn with_env_overrides(self) -> Result<Self, HarnessError> {
		let ceiling_secs = env_or("RUNNER_CEILING_SECS", self.ceiling.as_secs())?;
		let max_iterations = env_or("RUNNER_MAX_ITERATIONS", self.max_iterations.unwrap_or(0))?;
		Ok(LoopConfig {
			start_count: env_or("RUNNER_START", self.start_count)?,
			step: env_or("RUNNER_STEP", self.step)?,
			ceiling: Duration::from_secs(ceiling_secs),
			max_iterations: if max_iterations == 0 { None } else { Some(max_iterations) },
			targets: self.targets,
		})
	}
}

/// Work the loop drives once per iteration.
#[async_trait]
pub trait ScaleWorkload: Send {
	/// Produce a dataset with `count` records per base entity.
	async fn generate(&mut self, count: usize) -> Result<()>;

	/// Run one target against the current dataset.
	async fn run_target(&mut self, target: &str, count: usize) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
	Generate,
	RunTargets,
	CheckCeiling,
	Increment,
	Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
	GenerationFailed {
		message: String,
	},
	CeilingReached {
		target: String,
		secs: f64,
	},
	NoMeasurements,
	MaxIterations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetTiming {
	pub target: String,
	pub record_count: usize,
	pub secs: f64,
	/// The target exited with an error; its time still counts toward the ceiling.
	pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSummary {
	pub iterations: usize,
	pub last_count: usize,
	pub stop_reason: StopReason,
	pub timings: Vec<TargetTiming>,
}

pub async fn run_scale_loop<W: ScaleWorkload + ?Sized>(config: &LoopConfig, workload: &mut W) -> LoopSummary {
	let mut state = LoopState::Generate;
	let mut count = config.start_count;
	let mut iterations = 0;
	let mut iteration_timings: Vec<TargetTiming> = Vec::new();
	let mut timings: Vec<TargetTiming> = Vec::new();
	let mut stop_reason = StopReason::NoMeasurements;

	while state != LoopState::Stop {
		state = match state {
			LoopState::Generate => {
				iterations += 1;
				info!("Iteration {}: generating {} records", iterations, count);
				match workload.generate(count).await {
					Ok(()) => LoopState::RunTargets,
					Err(e) => {
						error!("Data generation failed at {} records: {:#}", count, e);
						stop_reason = StopReason::GenerationFailed {
							message: format!("{:#}", e),
						};
						LoopState::Stop
					}
				}
			}
			LoopState::RunTargets => {
				iteration_timings.clear();
				for target in &config.targets {
					let start = Instant::now();
					let outcome = workload.run_target(target, count).await;
					let secs = start.elapsed().as_secs_f64();
					iteration_timings.push(TargetTiming {
						target: target.clone(),
						record_count: count,
						secs,
						failed: outcome.is_err(),
					});
					match outcome {
						Ok(()) => info!("{} finished {} records in {:.2}s", target, count, secs),
						Err(e) => {
							error!("{} failed at {} records after {:.2}s: {:#}", target, count, secs, e);
							break;
						}
					}
				}
				LoopState::CheckCeiling
			}
			LoopState::CheckCeiling => {
				timings.extend(iteration_timings.iter().cloned());
				let slowest = iteration_timings
					.iter()
					.max_by(|a, b| a.secs.total_cmp(&b.secs));

				match slowest {
					None => {
						warn!("No target produced a timing at {} records", count);
						stop_reason = StopReason::NoMeasurements;
						LoopState::Stop
					}
					Some(timing) if timing.secs >= config.ceiling.as_secs_f64() => {
						info!(
							"{} took {:.2}s, at or above the {}s ceiling",
							timing.target,
							timing.secs,
							config.ceiling.as_secs()
						);
						stop_reason = StopReason::CeilingReached {
							target: timing.target.clone(),
							secs: timing.secs,
						};
						LoopState::Stop
					}
					Some(_) if config.max_iterations.is_some_and(|max| iterations >= max) => {
						stop_reason = StopReason::MaxIterations;
						LoopState::Stop
					}
					Some(_) => LoopState::Increment,
				}
			}
			LoopState::Increment => {
				count += config.step;
				LoopState::Generate
			}
			LoopState::Stop => LoopState::Stop,
		};
	}

	LoopSummary {
		iterations,
		last_count: count,
		stop_reason,
		timings,
	}
}
