use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::DispatcherConfig;
use crate::error::panic_message;
use crate::run_queue::RunQueue;
use crate::run_queue::Schedulable;
use crate::shutdown::ShutdownToken;

struct DispatcherInner {
	name: String,
	config: DispatcherConfig,
	run_queue: RunQueue,
	shutdown: ShutdownToken,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

/// A named pool of worker tasks executing mailbox turns for the cells bound
/// to it. Dispatchers are isolated from each other: each has its own
/// run-queue and its own workers.
#[derive(Clone)]
pub struct Dispatcher {
	inner: Arc<DispatcherInner>,
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("name", &self.inner.name)
			.field("config", &self.inner.config)
			.field("queued", &self.inner.run_queue.len())
			.finish()
	}
}

impl Dispatcher {
	/// Spawns `pool_size` workers on the current tokio runtime.
	pub(crate) fn start(name: &str, config: DispatcherConfig, shutdown: ShutdownToken) -> Self {
		let inner = Arc::new(DispatcherInner {
			name: name.to_string(),
			run_queue: RunQueue::new(),
			shutdown,
			workers: Mutex::new(Vec::with_capacity(config.pool_size)),
			config,
		});

		let workers = (0..inner.config.pool_size)
			.map(|index| tokio::spawn(work(index, inner.clone())))
			.collect::<Vec<_>>();
		*inner.workers.lock() = workers;

		tracing::debug!(
			dispatcher = %inner.name,
			pool_size = inner.config.pool_size,
			throughput = inner.config.throughput,
			"dispatcher started"
		);
		Self { inner }
	}

	/// Name the dispatcher was configured under, e.g. `default`.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Number of worker tasks shared by every cell bound to this dispatcher.
	pub fn pool_size(&self) -> usize {
		self.inner.config.pool_size
	}

	/// Max user messages one cell processes per turn before yielding.
	pub fn throughput(&self) -> usize {
		self.inner.config.throughput
	}

	/// Wall-clock budget of a turn, if any. A turn ends at whichever of
	/// this and `throughput` is reached first.
	pub fn throughput_deadline(&self) -> Option<Duration> {
		self.inner.config.throughput_deadline
	}

	/// Cells currently waiting for a worker.
	pub fn queued(&self) -> usize {
		self.inner.run_queue.len()
	}

	pub(crate) fn schedule(&self, cell: Arc<dyn Schedulable>) -> bool {
		self.inner.run_queue.notify_runnable(cell)
	}

	/// Signals the workers to exit once their current turn ends; tokens
	/// still queued are abandoned.
	pub(crate) fn shutdown(&self) {
		self.inner.shutdown.cancel();
	}

	/// Waits for every worker to exit. Must not be awaited from inside an
	/// actor running on this dispatcher.
	pub(crate) async fn join(&self) {
		let workers = std::mem::take(&mut *self.inner.workers.lock());
		for worker in workers {
			if let Err(err) = worker.await {
				if err.is_panic() {
					tracing::error!(dispatcher = %self.inner.name, "dispatcher worker panicked");
				}
			}
		}
	}
}

async fn work(index: usize, inner: Arc<DispatcherInner>) {
	tracing::trace!(dispatcher = %inner.name, worker = index, "worker started");

	while let Some(cell) = inner.run_queue.next(&inner.shutdown).await {
		let turn = AssertUnwindSafe(cell.clone().run()).catch_unwind().await;
		if let Err(payload) = turn {
			tracing::warn!(
				dispatcher = %inner.name,
				path = %cell.path(),
				panic = %panic_message(&*payload),
				"panic escaped an actor turn"
			);
		}
		inner.run_queue.release(cell);
	}

	tracing::trace!(dispatcher = %inner.name, worker = index, "worker stopped");
}
