//! Request/response on top of `tell`: a temporary reference registered
//! under `/temp` receives the reply (or a death-watch notification) and
//! completes a oneshot.

use std::any::Any;
use std::any::type_name;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use take_once::TakeOnce;
use tokio::sync::oneshot;

use crate::actor_ref::ActorRef;
use crate::actor_ref::AnyRef;
use crate::actor_ref::AnyTarget;
use crate::error::AskError;
use crate::path::ActorPath;
use crate::system::SystemShared;
use crate::system_message::SystemMessage;

pub(crate) enum TempEvent {
	Reply(Box<dyn Any + Send>),
	Terminated(ActorPath),
}

/// One-shot reply target. The first reply or `Terminated` wins; anything
/// later is dropped.
pub(crate) struct TempRef {
	path: ActorPath,
	slot: TakeOnce<oneshot::Sender<TempEvent>>,
	done: AtomicBool,
}

impl TempRef {
	pub fn new(path: ActorPath) -> (Arc<Self>, oneshot::Receiver<TempEvent>) {
		let (tx, rx) = oneshot::channel();
		let slot = TakeOnce::new();
		let _ = slot.store(tx);
		let temp = Arc::new(Self {
			path,
			slot,
			done: AtomicBool::new(false),
		});
		(temp, rx)
	}

	fn complete(&self, event: TempEvent) {
		match self.slot.take() {
			Some(tx) => {
				self.done.store(true, Ordering::SeqCst);
				let _ = tx.send(event);
			}
			None => tracing::trace!(path = %self.path, "late message to completed temporary reference"),
		}
	}
}

impl AnyTarget for TempRef {
	fn deliver_any(&self, message: Box<dyn Any + Send>, _sender: Option<AnyRef>) {
		self.complete(TempEvent::Reply(message));
	}

	fn send_system(&self, message: SystemMessage) -> Result<(), SystemMessage> {
		if let SystemMessage::Terminated { actor } = message {
			self.complete(TempEvent::Terminated(actor));
		}
		Ok(())
	}

	fn is_terminated(&self) -> bool {
		self.done.load(Ordering::SeqCst)
	}
}

/// Unregisters the temporary reference when the waiting side finishes,
/// times out or is dropped.
pub(crate) struct TempRegistration {
	system: Arc<SystemShared>,
	path: ActorPath,
}

impl TempRegistration {
	pub fn new(system: Arc<SystemShared>, path: ActorPath) -> Self {
		Self { system, path }
	}
}

impl Drop for TempRegistration {
	fn drop(&mut self) {
		self.system.temps.remove(&self.path);
	}
}

impl<M: Send + 'static> ActorRef<M> {
	/// Sends `message` with a temporary reference as sender and waits for
	/// the first reply, at most `timeout`. The timeout runs independently
	/// of what happens to the target meanwhile (stop, restart).
	pub async fn ask<R: Send + 'static>(&self, message: M, timeout: Duration) -> Result<R, AskError> {
		let system = self.system().upgrade().ok_or(AskError::SystemShutdown)?;
		let (reply_to, rx, _registration) = system.register_temp();

		self.tell(message, Some(reply_to));
		await_reply(rx, timeout).await
	}
}

pub(crate) async fn await_reply<R: Send + 'static>(
	rx: oneshot::Receiver<TempEvent>,
	timeout: Duration,
) -> Result<R, AskError> {
	match tokio::time::timeout(timeout, rx).await {
		Ok(Ok(TempEvent::Reply(reply))) => reply
			.downcast::<R>()
			.map(|reply| *reply)
			.map_err(|_| AskError::UnexpectedReply {
				expected: type_name::<R>(),
			}),
		Ok(Ok(TempEvent::Terminated(_))) => Err(AskError::UnexpectedReply {
			expected: type_name::<R>(),
		}),
		// the registry dropped the reference: system shutdown
		Ok(Err(_)) => Err(AskError::SystemShutdown),
		Err(_) => Err(AskError::Timeout(timeout)),
	}
}

pub(crate) async fn await_termination(
	rx: oneshot::Receiver<TempEvent>,
	timeout: Duration,
) -> Result<(), AskError> {
	match tokio::time::timeout(timeout, rx).await {
		Ok(Ok(TempEvent::Terminated(_))) => Ok(()),
		Ok(Ok(TempEvent::Reply(_))) => Err(AskError::UnexpectedReply { expected: "Terminated" }),
		Ok(Err(_)) => Err(AskError::SystemShutdown),
		Err(_) => Err(AskError::Timeout(timeout)),
	}
}
