//! Per-cycle wall-clock timing

use std::{fmt, time::Duration};

use tokio::time::Instant;

/// Timestamps for one pipeline cycle
#[derive(Clone, Debug)]
pub struct CycleTimer {
	started: Instant,
	request_started: Option<Instant>,
	request_finished: Option<Instant>,
}

impl CycleTimer {
	pub fn start() -> Self {
		Self {
			started: Instant::now(),
			request_started: None,
			request_finished: None,
		}
	}

	pub fn request_started(&mut self) {
		self.request_started = Some(Instant::now());
	}

	/// Mark the network call as completed, whether it succeeded or failed
	pub fn request_finished(&mut self) {
		self.request_finished = Some(Instant::now());
	}

	pub fn finish(&self) -> CycleReport {
		let network = match (self.request_started, self.request_finished) {
			(Some(start), Some(end)) => Some(end.duration_since(start)),
			_ => None,
		};
		CycleReport {
			total: self.started.elapsed(),
			network,
		}
	}
}

/// Durations reported at the end of a cycle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
	pub total: Duration,
	/// `None` when the network call never ran or never completed
	pub network: Option<Duration>,
}

impl CycleReport {
	/// Log at `info` for cycles that reached the requester, at `debug` for skipped ones
	pub fn emit(&self, requested: bool) {
		if requested {
			tracing::info!("{}", self);
		} else {
			tracing::debug!("{}", self);
		}
	}
}

fn millis(d: Duration) -> String {
	format!("{:.2}", d.as_secs_f64() * 1000.0)
}

impl fmt::Display for CycleReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Total running time: {} ms, API call time: ", millis(self.total))?;
		match self.network {
			Some(d) => write!(f, "{} ms", millis(d)),
			None => write!(f, "N/A"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn network_time_measured_from_request_start_to_finish() {
		let mut timer = CycleTimer::start();
		tokio::time::advance(Duration::from_millis(5)).await;
		timer.request_started();
		tokio::time::advance(Duration::from_millis(120)).await;
		timer.request_finished();
		tokio::time::advance(Duration::from_millis(3)).await;

		let report = timer.finish();
		assert_eq!(report.network, Some(Duration::from_millis(120)));
		assert_eq!(report.total, Duration::from_millis(128));
	}

	#[tokio::test(start_paused = true)]
	async fn network_unavailable_without_request() {
		let timer = CycleTimer::start();
		tokio::time::advance(Duration::from_millis(2)).await;
		let report = timer.finish();
		assert_eq!(report.network, None);
		assert_eq!(report.to_string(), "Total running time: 2.00 ms, API call time: N/A");
	}

	#[tokio::test(start_paused = true)]
	async fn network_unavailable_while_request_outstanding() {
		let mut timer = CycleTimer::start();
		timer.request_started();
		tokio::time::advance(Duration::from_millis(10)).await;
		assert_eq!(timer.finish().network, None);
	}

	#[test]
	fn display_formats_milliseconds() {
		let report = CycleReport {
			total: Duration::from_micros(15_250),
			network: Some(Duration::from_micros(12_010)),
		};
		assert_eq!(report.to_string(), "Total running time: 15.25 ms, API call time: 12.01 ms");
	}
}
