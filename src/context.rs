use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::Actor;
use crate::actor::Props;
use crate::actor::Receive;
use crate::actor_ref::ActorRef;
use crate::actor_ref::Addressable;
use crate::actor_ref::AnyRef;
use crate::actor_ref::publish_dead_letter;
use crate::dead_letter::DeadLetterReason;
use crate::envelope::Envelope;
use crate::error::AskError;
use crate::error::SpawnError;
use crate::path::ActorId;
use crate::path::ActorPath;
use crate::path::is_valid_name;
use crate::supervision::SupervisorStrategy;
use crate::system::ActorSystem;
use crate::system_message::SystemMessage;

pub(crate) struct ChildRecord {
	pub id: ActorId,
	pub name: String,
	pub any: AnyRef,
}

/// Per-actor view of the runtime, handed to every hook and handler.
///
/// Survives restarts: children, watches and watchers belong to the cell,
/// not to the actor instance.
pub struct Context<A: Actor> {
	myself: ActorRef<A::Message>,
	id: ActorId,
	system: ActorSystem,
	pub(crate) sender: Option<AnyRef>,
	pub(crate) strategy: Arc<SupervisorStrategy>,
	pub(crate) children: Vec<ChildRecord>,
	pub(crate) watching: HashSet<ActorPath>,
	pub(crate) watchers: Vec<AnyRef>,
	pub(crate) behavior: Option<Receive<A>>,
	pub(crate) terminating: bool,
	next_child: u64,
	span: tracing::Span,
}

impl<A: Actor> Context<A> {
	pub(crate) fn new(
		myself: ActorRef<A::Message>,
		id: ActorId,
		system: ActorSystem,
		strategy: Arc<SupervisorStrategy>,
		span: tracing::Span,
	) -> Self {
		Self {
			myself,
			id,
			system,
			sender: None,
			strategy,
			children: Vec::new(),
			watching: HashSet::new(),
			watchers: Vec::new(),
			behavior: None,
			terminating: false,
			next_child: 0,
			span,
		}
	}

	/// Reference to this actor, stable across restarts.
	pub fn myself(&self) -> &ActorRef<A::Message> {
		&self.myself
	}

	/// Arena id of this actor.
	pub fn id(&self) -> ActorId {
		self.id
	}

	/// Path of this actor.
	pub fn path(&self) -> &ActorPath {
		self.myself.path()
	}

	/// The system this actor lives in.
	pub fn system(&self) -> &ActorSystem {
		&self.system
	}

	/// The tracing span every turn of this actor runs in.
	pub fn span(&self) -> &tracing::Span {
		&self.span
	}

	/// Sender of the message being processed, if it had one.
	pub fn sender(&self) -> Option<&AnyRef> {
		self.sender.as_ref()
	}

	/// Sends `message` back to the current sender. Without a sender the
	/// reply goes to dead letters.
	pub fn reply<T: Send + 'static>(&self, message: T) {
		match &self.sender {
			Some(sender) => sender.tell(message, Some(self.myself.to_any())),
			None => publish_dead_letter(
				self.myself.system(),
				self.path(),
				Envelope::new(message, None).erase(),
				DeadLetterReason::NoSender,
			),
		}
	}

	/// `tell` with this actor as the sender.
	pub fn tell<N: Send + 'static>(&self, target: &ActorRef<N>, message: N) {
		target.tell(message, Some(self.myself.to_any()));
	}

	/// Spawns a child supervised by this actor's strategy.
	pub fn spawn<C: Actor>(
		&mut self,
		props: Props<C>,
		name: &str,
	) -> Result<ActorRef<C::Message>, SpawnError> {
		if !is_valid_name(name) {
			return Err(SpawnError::InvalidName(name.to_string()));
		}
		self.spawn_named(props, name.to_string())
	}

	/// Spawns a child under a generated `$n` name.
	pub fn spawn_anonymous<C: Actor>(&mut self, props: Props<C>) -> Result<ActorRef<C::Message>, SpawnError> {
		self.next_child += 1;
		let name = format!("${}", self.next_child);
		self.spawn_named(props, name)
	}

	fn spawn_named<C: Actor>(
		&mut self,
		props: Props<C>,
		name: String,
	) -> Result<ActorRef<C::Message>, SpawnError> {
		if self.terminating {
			return Err(SpawnError::ParentTerminating(self.path().clone()));
		}
		let path = self.path().child(&name);
		let spawned = self
			.system
			.shared()
			.spawn_cell(props, path, Some(self.id), self.strategy.clone())?;

		self.children.push(ChildRecord {
			id: spawned.id,
			name,
			any: spawned.any,
		});
		Ok(spawned.actor_ref)
	}

	/// Children that are not yet known to have terminated, including those
	/// still starting.
	pub fn children(&self) -> impl Iterator<Item = &AnyRef> {
		self.children.iter().map(|child| &child.any)
	}

	/// A live child by name.
	pub fn child(&self, name: &str) -> Option<&AnyRef> {
		self.children
			.iter()
			.find(|child| child.name == name)
			.map(|child| &child.any)
	}

	/// Asynchronous: the target finishes its current message first.
	pub fn stop(&self, target: &impl Addressable) {
		let _ = target.any_ref().send_system(SystemMessage::Stop);
	}

	/// Stops this actor once the current message is processed.
	pub fn stop_self(&self) {
		let _ = self.myself.to_any().send_system(SystemMessage::Stop);
	}

	/// Subscribes to the termination of `target`; `Actor::on_terminated`
	/// runs once it happens. Watching an actor that is already gone yields
	/// the notification right away.
	pub fn watch(&mut self, target: &impl Addressable) {
		let target = target.any_ref();
		if target.path() == self.path() || !self.watching.insert(target.path().clone()) {
			return;
		}

		let watcher = self.myself.to_any();
		if target.send_system(SystemMessage::Watch { watcher }).is_err() {
			let actor = target.path().clone();
			let _ = self
				.myself
				.to_any()
				.send_system(SystemMessage::Terminated { actor });
		}
	}

	/// A notification already in flight is discarded.
	pub fn unwatch(&mut self, target: &impl Addressable) {
		let target = target.any_ref();
		if self.watching.remove(target.path()) {
			let _ = target.send_system(SystemMessage::Unwatch {
				watcher: self.path().clone(),
			});
		}
	}

	/// Whether a `Terminated` notification for `target` is still expected.
	pub fn is_watching(&self, target: &impl Addressable) -> bool {
		self.watching.contains(target.any_ref().path())
	}

	/// Replaces the message handler, starting with the next message.
	pub fn become_with(&mut self, behavior: Receive<A>) {
		self.behavior = Some(behavior);
	}

	/// Back to `Actor::receive`.
	pub fn unbecome(&mut self) {
		self.behavior = None;
	}

	/// Asks `target` without blocking this actor; the outcome, mapped into
	/// one of this actor's messages, arrives in its mailbox later.
	pub fn pipe_ask<N, R, F>(&self, target: &ActorRef<N>, message: N, timeout: Duration, map: F)
	where
		N: Send + 'static,
		R: Send + 'static,
		F: FnOnce(Result<R, AskError>) -> A::Message + Send + 'static,
	{
		let target = target.clone();
		let myself = self.myself.clone();
		tokio::spawn(async move {
			let outcome = target.ask::<R>(message, timeout).await;
			myself.tell(map(outcome), Some(target.to_any()));
		});
	}
}
