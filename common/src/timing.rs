use std::future::Future;
use std::str::FromStr;
use std::time::{ Duration, Instant };

use anyhow::Result;
use serde::{ Deserialize, Serialize };
use tracing::error;

use crate::error::HarnessError;

/// What the timed runner does when a unit of work fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
	/// Return the error and abort the phase.
	Propagate,
	/// Log the error and report a zero duration so the run continues.
	#[default]
	RecordZero,
}

impl FromStr for FailurePolicy {
	type Err = HarnessError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"propagate" => Ok(FailurePolicy::Propagate),
			"record_zero" => Ok(FailurePolicy::RecordZero),
			_ =>
				Err(HarnessError::InvalidConfig {
					key: "on_failure".to_string(),
					value: s.to_string(),
				}),
		}
	}
}

/// Run `f` once and return the wall-clock time it took.
///
/// Only the awaited work is timed; anything built before the call is not.
pub async fn measure_execution<F, Fut>(policy: FailurePolicy, f: F) -> Result<Duration>
	where F: FnOnce() -> Fut, Fut: Future<Output = Result<()>>
{
	let start = Instant::now();
	let outcome = f().await;
	let duration = start.elapsed();

	match outcome {
		Ok(()) => Ok(duration),
		Err(e) =>
			match policy {
				FailurePolicy::Propagate => Err(e),
				FailurePolicy::RecordZero => {
					error!("Operation failed after {:?}, recording zero duration: {:#}", duration, e);
					Ok(Duration::ZERO)
				}
			}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn times_a_no_op() {
		let elapsed = measure_execution(FailurePolicy::Propagate, || async { anyhow::Ok(()) }).await.unwrap();
		assert!(elapsed >= Duration::ZERO);
	}

	#[tokio::test]
	async fn includes_awaited_work() {
		let elapsed = measure_execution(FailurePolicy::Propagate, || async {
			tokio::time::sleep(Duration::from_millis(20)).await;
			anyhow::Ok(())
		}).await.unwrap();
		assert!(elapsed >= Duration::from_millis(20));
	}

	#[tokio::test]
	async fn propagate_returns_the_error() {
		let result = measure_execution(FailurePolicy::Propagate, || async {
			Err::<(), _>(anyhow::anyhow!("connection reset"))
		}).await;
		assert_eq!(result.unwrap_err().to_string(), "connection reset");
	}

	#[tokio::test]
	async fn record_zero_swallows_the_error() {
		let elapsed = measure_execution(FailurePolicy::RecordZero, || async {
			tokio::time::sleep(Duration::from_millis(5)).await;
			Err::<(), _>(anyhow::anyhow!("duplicate key"))
		}).await.unwrap();
		assert_eq!(elapsed, Duration::ZERO);
	}

	#[test]
	fn parses_policy_names() {
		assert_eq!("propagate".parse::<FailurePolicy>().unwrap(), FailurePolicy::Propagate);
		assert_eq!("RECORD_ZERO".parse::<FailurePolicy>().unwrap(), FailurePolicy::RecordZero);
		assert!("retry".parse::<FailurePolicy>().is_err());
	}
}
