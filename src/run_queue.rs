use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crossbeam::queue::SegQueue;
use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::path::ActorPath;
use crate::shutdown::ShutdownToken;

/// Something a dispatcher worker can run a turn for.
pub(crate) trait Schedulable: Send + Sync + 'static {
	/// Set while a token for this cell is queued or a worker runs it.
	fn scheduled(&self) -> &AtomicBool;

	fn has_pending(&self) -> bool;

	fn run(self: Arc<Self>) -> BoxFuture<'static, ()>;

	fn path(&self) -> &ActorPath;
}

/// FIFO of runnable cells for one dispatcher.
pub(crate) struct RunQueue {
	queue: SegQueue<Arc<dyn Schedulable>>,
	notify: Notify,
}

impl RunQueue {
	pub fn new() -> Self {
		Self {
			queue: SegQueue::new(),
			notify: Notify::new(),
		}
	}

	/// Enqueues a token for `cell` unless one is already outstanding or the
	/// cell is running. Returns whether a token was added.
	pub fn notify_runnable(&self, cell: Arc<dyn Schedulable>) -> bool {
		if cell
			.scheduled()
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return false;
		}
		tracing::trace!(path = %cell.path(), "runnable");
		self.queue.push(cell);
		self.notify.notify_one();
		true
	}

	/// Ends a turn: clears the flag, then re-enqueues at the tail if work
	/// arrived or remained. The re-check after clearing closes the window in
	/// which a concurrent `notify_runnable` saw the flag still set.
	pub fn release(&self, cell: Arc<dyn Schedulable>) {
		cell.scheduled().store(false, Ordering::SeqCst);
		if cell.has_pending() {
			self.notify_runnable(cell);
		}
	}

	/// Waits for the next runnable cell; `None` once `shutdown` fires.
	pub async fn next(&self, shutdown: &ShutdownToken) -> Option<Arc<dyn Schedulable>> {
		loop {
			if shutdown.is_cancelled() {
				return None;
			}
			if let Some(cell) = self.queue.pop() {
				return Some(cell);
			}

			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(cell) = self.queue.pop() {
				return Some(cell);
			}

			tokio::select! {
				_ = &mut notified => {}
				_ = shutdown.cancelled() => return None,
			}
		}
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use futures::FutureExt;

	use super::*;

	struct Probe {
		scheduled: AtomicBool,
		pending: AtomicUsize,
		path: ActorPath,
	}

	impl Probe {
		fn new(name: &str, pending: usize) -> Arc<Self> {
			Arc::new(Self {
				scheduled: AtomicBool::new(false),
				pending: AtomicUsize::new(pending),
				path: ActorPath::root("test").child(name),
			})
		}
	}

	impl Schedulable for Probe {
		fn scheduled(&self) -> &AtomicBool {
			&self.scheduled
		}

		fn has_pending(&self) -> bool {
			self.pending.load(Ordering::SeqCst) > 0
		}

		fn run(self: Arc<Self>) -> BoxFuture<'static, ()> {
			async move {
				self.pending.fetch_sub(1, Ordering::SeqCst);
			}
			.boxed()
		}

		fn path(&self) -> &ActorPath {
			&self.path
		}
	}

	#[test]
	fn at_most_one_outstanding_token() {
		let queue = RunQueue::new();
		let probe = Probe::new("probe", 3);

		assert!(queue.notify_runnable(probe.clone()));
		assert!(!queue.notify_runnable(probe.clone()));
		assert!(!queue.notify_runnable(probe.clone()));
		assert_eq!(queue.len(), 1);
	}

	#[tokio::test]
	async fn release_requeues_at_tail_while_work_remains() {
		let queue = RunQueue::new();
		let shutdown = ShutdownToken::new();
		let first = Probe::new("first", 2);
		let second = Probe::new("second", 1);

		queue.notify_runnable(first.clone());
		queue.notify_runnable(second.clone());

		let cell = queue.next(&shutdown).await.unwrap();
		assert_eq!(cell.path(), first.path());
		cell.clone().run().await;
		queue.release(cell);

		// `first` still has work but goes behind `second`
		let cell = queue.next(&shutdown).await.unwrap();
		assert_eq!(cell.path(), second.path());
		cell.clone().run().await;
		queue.release(cell);
		assert!(!second.scheduled.load(Ordering::SeqCst));

		let cell = queue.next(&shutdown).await.unwrap();
		cell.clone().run().await;
		queue.release(cell);
		assert_eq!(queue.len(), 0);
		assert!(!first.scheduled.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn next_returns_none_after_shutdown() {
		let queue = RunQueue::new();
		let shutdown = ShutdownToken::new();
		let waiter = {
			let shutdown = shutdown.clone();
			async move { queue.next(&shutdown).await.is_none() }
		};
		shutdown.cancel();
		assert!(waiter.await);
	}
}
