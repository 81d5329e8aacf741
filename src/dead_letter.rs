use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::envelope::Envelope;
use crate::path::ActorPath;

/// Why a message could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterReason {
	/// The recipient stopped, or was stopping when the message arrived.
	Terminated,
	/// A bounded mailbox was at capacity.
	MailboxFull,
	/// Nothing lives at the path.
	Unresolved,
	/// A reply was sent while the current message had no sender.
	NoSender,
	/// An untyped send carried a payload the recipient does not accept.
	TypeMismatch,
}

impl DeadLetterReason {
	/// Stable label, also used as the `reason` metric label.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Terminated => "terminated",
			Self::MailboxFull => "mailbox_full",
			Self::Unresolved => "unresolved",
			Self::NoSender => "no_sender",
			Self::TypeMismatch => "type_mismatch",
		}
	}
}

impl fmt::Display for DeadLetterReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A message the runtime could not deliver.
pub struct DeadLetter {
	/// Where the message was headed.
	pub recipient: ActorPath,
	/// The original envelope, payload type erased.
	pub envelope: Envelope<Box<dyn Any + Send>>,
	/// Why it was not delivered.
	pub reason: DeadLetterReason,
}

impl DeadLetter {
	/// The payload, if it is a `T`.
	pub fn message<T: 'static>(&self) -> Option<&T> {
		self.envelope.message.downcast_ref::<T>()
	}

	/// Path of the original sender, if there was one.
	pub fn sender(&self) -> Option<&ActorPath> {
		self.envelope.sender.as_ref().map(|s| s.path())
	}
}

impl fmt::Debug for DeadLetter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeadLetter")
			.field("recipient", &self.recipient)
			.field("sender", &self.sender())
			.field("reason", &self.reason)
			.finish()
	}
}

/// Receives every message the runtime fails to deliver.
pub trait DeadLetterSink: Send + Sync + 'static {
	fn receive(&self, letter: DeadLetter);
}

/// Default sink: logs each dead letter at debug level.
#[derive(Debug, Default)]
pub struct LoggingDeadLetters;

impl DeadLetterSink for LoggingDeadLetters {
	fn receive(&self, letter: DeadLetter) {
		tracing::debug!(
			recipient = %letter.recipient,
			sender = ?letter.sender(),
			reason = %letter.reason,
			"dead letter"
		);
	}
}

struct SinkSlot(Arc<dyn DeadLetterSink>);

pub(crate) struct DeadLetters {
	sink: ArcSwap<SinkSlot>,
}

impl DeadLetters {
	pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
		Self {
			sink: ArcSwap::from_pointee(SinkSlot(sink)),
		}
	}

	pub fn replace(&self, sink: Arc<dyn DeadLetterSink>) {
		self.sink.store(Arc::new(SinkSlot(sink)));
	}

	pub fn publish(&self, letter: DeadLetter) {
		metrics::counter!("runy.dead_letters", "reason" => letter.reason.as_str()).increment(1);
		let slot = self.sink.load();
		slot.0.receive(letter);
	}
}
