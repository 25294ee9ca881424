//! Pipeline execution: extraction, dedup gate, answer request, matching, activation

use std::{
	future::Future,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
};

use color_eyre::Result;
use tokio::{sync::mpsc, task::JoinSet};
use v_utils::{elog, log};

use crate::{
	MatchedOption,
	config::AppConfig,
	llm::{CompletionService, build_prompt},
	matcher::match_reply,
	page::PollPage,
	timing::{CycleReport, CycleTimer},
	watcher::{ChangeWatcher, MutationSource},
};

/// How one pipeline cycle ended
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
	/// No question element on the page
	NoQuestion,
	/// Question identical to the last processed one
	Duplicate,
	/// Reading from or clicking on the page failed
	PageFailed(String),
	/// The completion request failed (bad status, transport, malformed body)
	RequestFailed(String),
	/// A newer question was admitted while this reply was outstanding
	Stale,
	/// No visible option text is contained in the reply
	NoMatch,
	/// The matched option was clicked
	Activated(MatchedOption),
	/// The matched option disappeared before it could be clicked
	ActivationMissed(MatchedOption),
}

/// Result of a finished cycle, with its timing
#[derive(Clone, Debug)]
pub struct CycleResult {
	pub question: Option<String>,
	pub outcome: CycleOutcome,
	pub report: CycleReport,
}

/// What [`Pipeline::on_mutation`] did with the current page state
#[derive(Clone, Debug)]
pub enum Admission {
	/// Stopped at the extractor or the gate
	Skipped(CycleResult),
	/// A new question was admitted; its request runs in the background under `token`
	Dispatched { token: u64 },
}

/// Owns the dedup state and the in-flight cycles for one page
pub struct Pipeline<P, C> {
	page: Arc<P>,
	completion: Arc<C>,
	last_question: Option<String>,
	current_cycle: Arc<AtomicU64>,
	discard_stale_replies: bool,
	in_flight: JoinSet<CycleResult>,
}

impl<P: PollPage, C: CompletionService> Pipeline<P, C> {
	pub fn new(page: P, completion: C, config: &AppConfig) -> Self {
		Self::from_shared(Arc::new(page), Arc::new(completion), config.discard_stale_replies)
	}

	pub fn from_shared(page: Arc<P>, completion: Arc<C>, discard_stale_replies: bool) -> Self {
		Self {
			page,
			completion,
			last_question: None,
			current_cycle: Arc::new(AtomicU64::new(0)),
			discard_stale_replies,
			in_flight: JoinSet::new(),
		}
	}

	pub fn last_question(&self) -> Option<&str> {
		self.last_question.as_deref()
	}

	pub fn in_flight(&self) -> usize {
		self.in_flight.len()
	}

	/// Record `question` as processed unless it equals the last one. Returns whether it is new.
	fn admit(&mut self, question: &str) -> bool {
		if self.last_question.as_deref() == Some(question) {
			return false;
		}
		self.last_question = Some(question.to_string());
		true
	}

	fn skip(&self, question: Option<String>, outcome: CycleOutcome, timer: CycleTimer) -> Admission {
		let report = timer.finish();
		report.emit(false);
		Admission::Skipped(CycleResult { question, outcome, report })
	}

	/// Entry point, called once per mutation burst.
	///
	/// Extraction and the gate complete before this returns; the request, matching and activation of
	/// an admitted question continue on a background task.
	pub async fn on_mutation(&mut self) -> Admission {
		let timer = CycleTimer::start();

		let snapshot = match self.page.snapshot().await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				elog!("Failed to extract poll: {}", e);
				return self.skip(None, CycleOutcome::PageFailed(e.to_string()), timer);
			}
		};

		let Some(question) = snapshot.question else {
			return self.skip(None, CycleOutcome::NoQuestion, timer);
		};

		if !self.admit(&question) {
			return self.skip(Some(question), CycleOutcome::Duplicate, timer);
		}

		log!("Found a new question: {}", question);
		tracing::debug!("Options: {:?}", snapshot.options);

		let token = self.current_cycle.fetch_add(1, Ordering::SeqCst) + 1;
		let cycle = AnswerCycle {
			page: self.page.clone(),
			completion: self.completion.clone(),
			current_cycle: self.current_cycle.clone(),
			discard_stale_replies: self.discard_stale_replies,
			token,
			question,
			options: snapshot.options,
			timer,
		};
		self.in_flight.spawn(cycle.run());

		Admission::Dispatched { token }
	}

	/// Wait for the next background cycle to finish. `None` when nothing is in flight.
	pub async fn next_completed(&mut self) -> Option<CycleResult> {
		loop {
			match self.in_flight.join_next().await? {
				Ok(result) => return Some(result),
				Err(e) => {
					elog!("Pipeline cycle task failed: {}", e);
				}
			}
		}
	}

	/// Collect cycles that already finished, without waiting
	pub fn reap(&mut self) -> Vec<CycleResult> {
		let mut done = Vec::new();
		while let Some(joined) = self.in_flight.try_join_next() {
			match joined {
				Ok(result) => done.push(result),
				Err(e) => {
					elog!("Pipeline cycle task failed: {}", e);
				}
			}
		}
		done
	}

	/// Wait for every in-flight cycle
	pub async fn drain(&mut self) -> Vec<CycleResult> {
		let mut done = Vec::new();
		while let Some(result) = self.next_completed().await {
			done.push(result);
		}
		done
	}

	pub fn abort_in_flight(&mut self) {
		if !self.in_flight.is_empty() {
			tracing::warn!("Abandoning {} in-flight cycle(s)", self.in_flight.len());
		}
		// dropping a JoinSet aborts every task in it
		drop(std::mem::take(&mut self.in_flight));
	}
}

/// Everything the background half of a cycle needs
struct AnswerCycle<P, C> {
	page: Arc<P>,
	completion: Arc<C>,
	current_cycle: Arc<AtomicU64>,
	discard_stale_replies: bool,
	token: u64,
	question: String,
	options: Vec<String>,
	timer: CycleTimer,
}

impl<P: PollPage, C: CompletionService> AnswerCycle<P, C> {
	async fn run(mut self) -> CycleResult {
		let prompt = build_prompt(&self.question, &self.options);

		self.timer.request_started();
		let reply = self.completion.complete(&prompt).await;
		self.timer.request_finished();

		let outcome = match reply {
			Err(e) => {
				elog!("Failed to get an answer from the completion service: {}", e);
				CycleOutcome::RequestFailed(e.to_string())
			}
			Ok(reply) => {
				log!("Answer from completion service: {}", reply);
				let current = self.current_cycle.load(Ordering::SeqCst);
				if self.discard_stale_replies && current != self.token {
					tracing::warn!("Discarding reply for superseded question {:?} (cycle {}, current {})", self.question, self.token, current);
					CycleOutcome::Stale
				} else {
					select_option(self.page.as_ref(), &reply).await
				}
			}
		};

		let report = self.timer.finish();
		report.emit(true);
		CycleResult {
			question: Some(self.question),
			outcome,
			report,
		}
	}
}

/// Re-read the visible options, match the reply against them and click the winner
async fn select_option<P: PollPage>(page: &P, reply: &str) -> CycleOutcome {
	let options = match page.option_texts().await {
		Ok(options) => options,
		Err(e) => {
			elog!("Failed to re-read options: {}", e);
			return CycleOutcome::PageFailed(e.to_string());
		}
	};

	let Some(matched) = match_reply(reply, &options) else {
		elog!("No matching option was found");
		return CycleOutcome::NoMatch;
	};

	match page.activate(&matched).await {
		Ok(true) => {
			log!("The correct answer was automatically selected: {}", matched.text);
			CycleOutcome::Activated(matched)
		}
		Ok(false) => {
			elog!("Matched option {} is no longer on the page", matched);
			CycleOutcome::ActivationMissed(matched)
		}
		Err(e) => {
			elog!("Failed to select option {}: {}", matched, e);
			CycleOutcome::PageFailed(e.to_string())
		}
	}
}

/// Drive `pipeline` from `source` until `shutdown` resolves or the source ends.
///
/// Runs one cycle up front so a question already on screen is picked up. When the source ends the
/// outstanding cycles are awaited, still racing `shutdown`; on shutdown they are abandoned.
pub async fn run<P, C, S, F>(pipeline: &mut Pipeline<P, C>, source: S, shutdown: F) -> Result<()>
where
	P: PollPage,
	C: CompletionService,
	S: MutationSource,
	F: Future<Output = ()>,
{
	let watcher = ChangeWatcher::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let subscription = watcher.subscribe(move |burst| {
		let _ = tx.send(burst);
	})?;

	let driver = tokio::spawn({
		let watcher = watcher.clone();
		async move {
			watcher.drive(source).await;
			watcher.unsubscribe(subscription);
		}
	});

	pipeline.on_mutation().await;

	tokio::pin!(shutdown);
	loop {
		tokio::select! {
			_ = &mut shutdown => {
				log!("Shutting down");
				watcher.unsubscribe(subscription);
				driver.abort();
				pipeline.abort_in_flight();
				return Ok(());
			}
			burst = rx.recv() => {
				let Some(burst) = burst else { break };
				tracing::trace!("Mutation burst of {} records", burst.records);
				pipeline.on_mutation().await;
				pipeline.reap();
			}
		}
	}

	log!("Page observation ended, waiting for {} outstanding cycle(s)", pipeline.in_flight());
	let interrupted = tokio::select! {
		_ = &mut shutdown => true,
		_ = pipeline.drain() => false,
	};
	if interrupted {
		log!("Shutting down");
		pipeline.abort_in_flight();
	}
	Ok(())
}
