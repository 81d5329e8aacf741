use std::collections::VecDeque;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::config::MailboxConfig;
use crate::envelope::Envelope;
use crate::system_message::SystemMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MailboxStatus {
	Open = 0,
	/// User messages are held back; system messages still drain.
	Suspended = 1,
	/// User messages are refused. System messages are refused only after
	/// the owning cell terminated.
	Closed = 2,
}

impl MailboxStatus {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::Open,
			1 => Self::Suspended,
			_ => Self::Closed,
		}
	}
}

pub(crate) enum EnqueueError<M> {
	Full(Envelope<M>),
	Closed(Envelope<M>),
}

pub(crate) struct Batch<M> {
	pub system: Vec<SystemMessage>,
	pub user: Vec<Envelope<M>>,
	/// User messages remain and the mailbox is open.
	pub more: bool,
}

struct SystemQueue {
	queue: VecDeque<SystemMessage>,
	closed: bool,
}

/// Per-cell queue pair. Only the worker holding the cell's scheduling flag
/// dequeues; any thread may enqueue.
pub(crate) struct Mailbox<M> {
	user: Mutex<VecDeque<Envelope<M>>>,
	system: Mutex<SystemQueue>,
	status: AtomicU8,
	capacity: Option<usize>,
}

impl<M> Mailbox<M> {
	/// Mailboxes start suspended; the cell opens them once the actor runs.
	pub fn new(config: MailboxConfig) -> Self {
		Self {
			user: Mutex::new(VecDeque::new()),
			system: Mutex::new(SystemQueue {
				queue: VecDeque::new(),
				closed: false,
			}),
			status: AtomicU8::new(MailboxStatus::Suspended as u8),
			capacity: config.capacity(),
		}
	}

	pub fn status(&self) -> MailboxStatus {
		MailboxStatus::from_u8(self.status.load(Ordering::SeqCst))
	}

	pub fn enqueue_user(&self, envelope: Envelope<M>) -> Result<(), EnqueueError<M>> {
		let mut queue = self.user.lock();
		// checked under the lock so `close` + `drain_user` never strand a message
		if self.status() == MailboxStatus::Closed {
			return Err(EnqueueError::Closed(envelope));
		}
		if let Some(capacity) = self.capacity {
			if queue.len() >= capacity {
				return Err(EnqueueError::Full(envelope));
			}
		}
		queue.push_back(envelope);
		Ok(())
	}

	pub fn enqueue_system(&self, message: SystemMessage) -> Result<(), SystemMessage> {
		let mut system = self.system.lock();
		if system.closed {
			return Err(message);
		}
		system.queue.push_back(message);
		Ok(())
	}

	/// Drains the whole system queue, then takes up to `max` user messages
	/// unless the mailbox is suspended or closed.
	pub fn dequeue_batch(&self, max: usize) -> Batch<M> {
		let system = self.system.lock().queue.drain(..).collect();

		let mut queue = self.user.lock();
		let open = self.status() == MailboxStatus::Open;
		let user = if open {
			let count = max.min(queue.len());
			queue.drain(..count).collect()
		} else {
			Vec::new()
		};
		let more = open && !queue.is_empty();

		Batch { system, user, more }
	}

	/// Puts unprocessed envelopes back at the head, keeping their order.
	pub fn requeue_front(&self, envelopes: Vec<Envelope<M>>) {
		let mut queue = self.user.lock();
		for envelope in envelopes.into_iter().rev() {
			queue.push_front(envelope);
		}
	}

	pub fn drain_user(&self) -> Vec<Envelope<M>> {
		self.user.lock().drain(..).collect()
	}

	pub fn has_system(&self) -> bool {
		!self.system.lock().queue.is_empty()
	}

	pub fn has_pending(&self) -> bool {
		if self.has_system() {
			return true;
		}
		let queue = self.user.lock();
		self.status() == MailboxStatus::Open && !queue.is_empty()
	}

	pub fn user_len(&self) -> usize {
		self.user.lock().len()
	}

	pub fn suspend(&self) {
		let _ = self.status.compare_exchange(
			MailboxStatus::Open as u8,
			MailboxStatus::Suspended as u8,
			Ordering::SeqCst,
			Ordering::SeqCst,
		);
	}

	pub fn resume(&self) {
		let _ = self.status.compare_exchange(
			MailboxStatus::Suspended as u8,
			MailboxStatus::Open as u8,
			Ordering::SeqCst,
			Ordering::SeqCst,
		);
	}

	pub fn close(&self) {
		let _queue = self.user.lock();
		self.status
			.store(MailboxStatus::Closed as u8, Ordering::SeqCst);
	}

	/// Refuses further system messages and hands back whatever was still
	/// queued.
	pub fn close_system(&self) -> Vec<SystemMessage> {
		let mut system = self.system.lock();
		system.closed = true;
		system.queue.drain(..).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn open(config: MailboxConfig) -> Mailbox<u32> {
		let mailbox = Mailbox::new(config);
		mailbox.resume();
		mailbox
	}

	fn values(batch: &Batch<u32>) -> Vec<u32> {
		batch.user.iter().map(|e| e.message).collect()
	}

	#[test]
	fn system_messages_drain_first_even_if_enqueued_later() {
		let mailbox = open(MailboxConfig::Unbounded);
		for i in 0..3 {
			assert!(mailbox.enqueue_user(Envelope::new(i, None)).is_ok());
		}
		mailbox.enqueue_system(SystemMessage::Stop).unwrap();

		let batch = mailbox.dequeue_batch(2);
		assert!(matches!(batch.system.as_slice(), [SystemMessage::Stop]));
		assert_eq!(values(&batch), vec![0, 1]);
		assert!(batch.more);

		let batch = mailbox.dequeue_batch(10);
		assert!(batch.system.is_empty());
		assert_eq!(values(&batch), vec![2]);
		assert!(!batch.more);
	}

	#[test]
	fn suspended_mailbox_only_yields_system_messages() {
		let mailbox = open(MailboxConfig::Unbounded);
		assert!(mailbox.enqueue_user(Envelope::new(7, None)).is_ok());
		mailbox.suspend();
		mailbox.enqueue_system(SystemMessage::Resume).unwrap();

		assert!(mailbox.has_pending());
		let batch = mailbox.dequeue_batch(5);
		assert_eq!(batch.system.len(), 1);
		assert!(batch.user.is_empty());
		assert!(!batch.more);
		assert!(!mailbox.has_pending());

		mailbox.resume();
		assert!(mailbox.has_pending());
		assert_eq!(values(&mailbox.dequeue_batch(5)), vec![7]);
	}

	#[test]
	fn bounded_mailbox_hands_back_overflow() {
		let mailbox = open(MailboxConfig::bounded(2));
		assert!(mailbox.enqueue_user(Envelope::new(1, None)).is_ok());
		assert!(mailbox.enqueue_user(Envelope::new(2, None)).is_ok());

		match mailbox.enqueue_user(Envelope::new(3, None)) {
			Err(EnqueueError::Full(envelope)) => assert_eq!(envelope.message, 3),
			_ => panic!("expected a full mailbox"),
		}
		assert_eq!(mailbox.user_len(), 2);
	}

	#[test]
	fn closed_mailbox_refuses_user_messages_but_not_system() {
		let mailbox = open(MailboxConfig::Unbounded);
		mailbox.close();
		assert!(matches!(
			mailbox.enqueue_user(Envelope::new(1, None)),
			Err(EnqueueError::Closed(_))
		));
		assert!(mailbox.enqueue_system(SystemMessage::Stop).is_ok());

		let leftovers = mailbox.close_system();
		assert_eq!(leftovers.len(), 1);
		assert!(mailbox.enqueue_system(SystemMessage::Stop).is_err());
		// closed is sticky
		mailbox.resume();
		assert_eq!(mailbox.status(), MailboxStatus::Closed);
	}

	#[test]
	fn requeue_front_keeps_order() {
		let mailbox = open(MailboxConfig::Unbounded);
		for i in 0..5 {
			assert!(mailbox.enqueue_user(Envelope::new(i, None)).is_ok());
		}
		let mut batch = mailbox.dequeue_batch(3);
		let rest = batch.user.split_off(1);
		mailbox.requeue_front(rest);

		assert_eq!(values(&mailbox.dequeue_batch(10)), vec![1, 2, 3, 4]);
	}
}
