//! Page mutation observation.
//!
//! A [`MutationSource`] produces one [`MutationBurst`] per batch of DOM changes. [`ChangeWatcher`] fans
//! those out to at most one subscribed callback, invoked exactly once per burst.

use std::{
	future::Future,
	sync::{
		Arc, Mutex,
		atomic::{AtomicU64, Ordering},
	},
};

use chromiumoxide::{
	Page,
	cdp::{
		browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams,
		js_protocol::runtime::{AddBindingParams, EventBindingCalled},
	},
	listeners::EventStream,
};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::StreamExt;

/// One batch of structural changes under `document.body`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MutationBurst {
	/// Number of mutation records in the batch, as reported by the page
	pub records: usize,
}

/// Anything that can yield mutation bursts, in order
pub trait MutationSource: Send + 'static {
	/// `None` once observation has ended (page closed, connection dropped)
	fn next_burst(&mut self) -> impl Future<Output = Option<MutationBurst>> + Send;
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(MutationBurst) + Send>;

struct Subscriber {
	id: SubscriptionId,
	callback: Callback,
}

/// Single-subscriber dispatch point for mutation bursts.
///
/// Cloning yields another handle to the same subscription slot. The callback runs while the slot is
/// locked, so it must not call back into the watcher.
#[derive(Clone, Default)]
pub struct ChangeWatcher {
	slot: Arc<Mutex<Option<Subscriber>>>,
	next_id: Arc<AtomicU64>,
}

impl ChangeWatcher {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Option<Subscriber>> {
		self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Register the callback. Fails if one is already registered.
	pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId>
	where
		F: FnMut(MutationBurst) + Send + 'static,
	{
		let mut slot = self.lock();
		if let Some(existing) = slot.as_ref() {
			bail!("Change watcher already has a subscriber ({:?})", existing.id);
		}
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		*slot = Some(Subscriber { id, callback: Box::new(callback) });
		Ok(id)
	}

	/// Drop the callback if `id` is the current subscription. Returns whether anything was removed.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut slot = self.lock();
		match slot.as_ref() {
			Some(sub) if sub.id == id => {
				*slot = None;
				true
			}
			_ => false,
		}
	}

	pub fn is_subscribed(&self) -> bool {
		self.lock().is_some()
	}

	/// Invoke the subscriber once for `burst`. Bursts with no subscriber are dropped.
	pub fn dispatch(&self, burst: MutationBurst) -> bool {
		let mut slot = self.lock();
		match slot.as_mut() {
			Some(sub) => {
				(sub.callback)(burst);
				true
			}
			None => {
				tracing::trace!("Dropping mutation burst of {} records, no subscriber", burst.records);
				false
			}
		}
	}

	/// Pump every burst from `source` into [`Self::dispatch`] until the source ends
	pub async fn drive<S: MutationSource>(&self, mut source: S) {
		while let Some(burst) = source.next_burst().await {
			self.dispatch(burst);
		}
		tracing::debug!("Mutation source ended");
	}
}

/// Page-side observer: calls the binding once per mutation batch with the record count
fn observer_script(binding: &str) -> String {
	let binding = serde_json::to_string(binding).unwrap_or_else(|_| "\"\"".to_string());
	format!(
		r#"
		(function() {{
			const binding = {binding};
			const install = () => {{
				if (window.__pollObserverInstalled) return;
				if (!document.body) {{
					document.addEventListener('DOMContentLoaded', install, {{ once: true }});
					return;
				}}
				window.__pollObserverInstalled = true;
				const observer = new MutationObserver((mutations) => {{
					if (typeof window[binding] === 'function') window[binding](String(mutations.length));
				}});
				observer.observe(document.body, {{ childList: true, subtree: true }});
			}};
			install();
		}})()
		"#
	)
}

/// [`MutationSource`] fed by a `MutationObserver` running inside a browser tab
pub struct DomMutationSource {
	events: EventStream<EventBindingCalled>,
	binding: String,
}

impl DomMutationSource {
	/// Expose the binding, install the observer in the current document and in every later one
	pub async fn attach(page: &Page, binding: &str) -> Result<Self> {
		let events = page
			.event_listener::<EventBindingCalled>()
			.await
			.map_err(|e| eyre!("Failed to listen for binding calls: {}", e))?;

		page.execute(AddBindingParams::new(binding))
			.await
			.map_err(|e| eyre!("Failed to add runtime binding: {}", e))?;

		let script = observer_script(binding);
		page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
			.await
			.map_err(|e| eyre!("Failed to register observer script: {}", e))?;
		page.evaluate(script).await.map_err(|e| eyre!("Failed to install mutation observer: {}", e))?;

		Ok(Self {
			events,
			binding: binding.to_string(),
		})
	}
}

impl MutationSource for DomMutationSource {
	async fn next_burst(&mut self) -> Option<MutationBurst> {
		while let Some(event) = self.events.next().await {
			if event.name != self.binding {
				continue;
			}
			let records = event.payload.parse().unwrap_or(0);
			return Some(MutationBurst { records });
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use tokio::sync::mpsc;

	use super::*;

	struct ChannelSource(mpsc::UnboundedReceiver<MutationBurst>);

	impl MutationSource for ChannelSource {
		async fn next_burst(&mut self) -> Option<MutationBurst> {
			self.0.recv().await
		}
	}

	fn counting_callback() -> (Arc<AtomicUsize>, impl FnMut(MutationBurst) + Send + 'static) {
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		(count, move |_: MutationBurst| {
			counter.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[test]
	fn each_burst_invokes_callback_once() {
		let watcher = ChangeWatcher::new();
		let (count, callback) = counting_callback();
		watcher.subscribe(callback).unwrap();

		assert!(watcher.dispatch(MutationBurst { records: 7 }));
		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert!(watcher.dispatch(MutationBurst { records: 1 }));
		assert_eq!(count.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn second_subscriber_is_rejected() {
		let watcher = ChangeWatcher::new();
		let (_, first) = counting_callback();
		let (_, second) = counting_callback();
		watcher.subscribe(first).unwrap();
		assert!(watcher.subscribe(second).is_err());
	}

	#[test]
	fn unsubscribe_stops_delivery() {
		let watcher = ChangeWatcher::new();
		let (count, callback) = counting_callback();
		let id = watcher.subscribe(callback).unwrap();

		assert!(watcher.unsubscribe(id));
		assert!(!watcher.unsubscribe(id));
		assert!(!watcher.is_subscribed());
		assert!(!watcher.dispatch(MutationBurst::default()));
		assert_eq!(count.load(Ordering::SeqCst), 0);

		let (_, again) = counting_callback();
		let new_id = watcher.subscribe(again).unwrap();
		assert_ne!(id, new_id);
	}

	#[test]
	fn clones_share_the_subscription() {
		let watcher = ChangeWatcher::new();
		let handle = watcher.clone();
		let (count, callback) = counting_callback();
		watcher.subscribe(callback).unwrap();

		handle.dispatch(MutationBurst { records: 3 });
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn drive_forwards_until_source_ends() {
		let (tx, rx) = mpsc::unbounded_channel();
		let watcher = ChangeWatcher::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		watcher.subscribe(move |burst: MutationBurst| sink.lock().unwrap().push(burst.records)).unwrap();

		for records in [2, 5, 1] {
			tx.send(MutationBurst { records }).unwrap();
		}
		drop(tx);
		watcher.drive(ChannelSource(rx)).await;

		assert_eq!(*seen.lock().unwrap(), vec![2, 5, 1]);
	}

	#[test]
	fn observer_watches_child_list_of_body_subtree() {
		let script = observer_script("__pollMutationBurst");
		assert!(script.contains(r#"const binding = "__pollMutationBurst";"#));
		assert!(script.contains("observer.observe(document.body, { childList: true, subtree: true });"));
	}
}
