//! Journal seam for event-sourced actors. The runtime only needs to await
//! a write; storage is up to the implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::actor::Actor;
use crate::context::Context;

/// Durable event store, keyed by persistence id.
pub trait Journal<E>: Send + Sync + 'static {
	/// Resolves with the event once it is durable.
	fn persist(&self, persistence_id: &str, event: E) -> BoxFuture<'static, anyhow::Result<E>>;
}

/// Journal kept in memory, with an optional artificial write latency.
pub struct InMemoryJournal<E> {
	events: Arc<Mutex<HashMap<String, Vec<E>>>>,
	latency: Option<Duration>,
}

impl<E> Clone for InMemoryJournal<E> {
	fn clone(&self) -> Self {
		Self {
			events: self.events.clone(),
			latency: self.latency,
		}
	}
}

impl<E> Default for InMemoryJournal<E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<E> InMemoryJournal<E> {
	/// An empty journal that acknowledges writes immediately.
	pub fn new() -> Self {
		Self {
			events: Arc::new(Mutex::new(HashMap::new())),
			latency: None,
		}
	}

	/// Delays every acknowledgement by `latency`.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Events stored under `persistence_id`, oldest first.
	pub fn events(&self, persistence_id: &str) -> Vec<E>
	where
		E: Clone,
	{
		self.events
			.lock()
			.get(persistence_id)
			.cloned()
			.unwrap_or_default()
	}
}

impl<E: Clone + Send + 'static> Journal<E> for InMemoryJournal<E> {
	fn persist(&self, persistence_id: &str, event: E) -> BoxFuture<'static, anyhow::Result<E>> {
		let events = self.events.clone();
		let persistence_id = persistence_id.to_string();
		let latency = self.latency;
		async move {
			if let Some(latency) = latency {
				tokio::time::sleep(latency).await;
			}
			events
				.lock()
				.entry(persistence_id)
				.or_default()
				.push(event.clone());
			Ok(event)
		}
		.boxed()
	}
}

impl<A: Actor> Context<A> {
	/// Writes `event` under this actor's path. Awaiting it inside a handler
	/// holds back the rest of the mailbox until the journal acknowledges.
	pub fn persist<E: 'static>(&self, journal: &dyn Journal<E>, event: E) -> BoxFuture<'static, anyhow::Result<E>> {
		journal.persist(self.path().as_str(), event)
	}
}
