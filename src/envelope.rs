use std::any::Any;
use std::fmt::Debug;

use crate::actor_ref::AnyRef;

/// A message paired with the reference of whoever sent it.
pub struct Envelope<M> {
	/// The payload.
	pub message: M,
	/// Where replies go; `None` for sends from outside any actor.
	pub sender: Option<AnyRef>,
}

impl<M: Debug> Debug for Envelope<M> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Envelope")
			.field("message", &self.message)
			.field("sender", &self.sender.as_ref().map(|s| s.path()))
			.finish()
	}
}

impl<M> Envelope<M> {
	/// Pairs `message` with its sender.
	pub fn new(message: M, sender: Option<AnyRef>) -> Self {
		Self { message, sender }
	}

	/// Payload and sender, by value.
	pub fn split(self) -> (M, Option<AnyRef>) {
		(self.message, self.sender)
	}

	/// Transforms the payload, keeping the sender.
	pub fn map<U>(self, func: impl FnOnce(M) -> U) -> Envelope<U> {
		Envelope {
			message: func(self.message),
			sender: self.sender,
		}
	}

	/// Erases the payload type, for dead letters and transports.
	pub fn erase(self) -> Envelope<Box<dyn Any + Send>>
	where
		M: Send + 'static,
	{
		self.map(|message| Box::new(message) as Box<dyn Any + Send>)
	}
}
