use std::any::Any;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Weak;

use crate::dead_letter::DeadLetter;
use crate::dead_letter::DeadLetterReason;
use crate::envelope::Envelope;
use crate::path::ActorPath;
use crate::system::SystemShared;
use crate::system_message::SystemMessage;
use crate::transport::Transport;

/// Untyped delivery target: a cell, or a temporary reply reference.
pub(crate) trait AnyTarget: Send + Sync + 'static {
	fn deliver_any(&self, message: Box<dyn Any + Send>, sender: Option<AnyRef>);

	/// Hands the message back when the target no longer accepts system
	/// messages, i.e. it terminated.
	fn send_system(&self, message: SystemMessage) -> Result<(), SystemMessage>;

	fn is_terminated(&self) -> bool;
}

pub(crate) trait Deliver<M>: AnyTarget {
	fn deliver(&self, envelope: Envelope<M>);
}

enum Route<M> {
	Local {
		typed: Weak<dyn Deliver<M>>,
		any: Weak<dyn AnyTarget>,
	},
	Remote(Arc<dyn Transport>),
	Dead,
}

impl<M> Clone for Route<M> {
	fn clone(&self) -> Self {
		match self {
			Self::Local { typed, any } => Self::Local {
				typed: typed.clone(),
				any: any.clone(),
			},
			Self::Remote(transport) => Self::Remote(transport.clone()),
			Self::Dead => Self::Dead,
		}
	}
}

/// Typed handle to an actor. Never exposes the cell; once the cell is gone
/// every send ends up in dead letters instead of failing the sender.
pub struct ActorRef<M> {
	path: ActorPath,
	route: Route<M>,
	system: Weak<SystemShared>,
}

impl<M> Clone for ActorRef<M> {
	fn clone(&self) -> Self {
		Self {
			path: self.path.clone(),
			route: self.route.clone(),
			system: self.system.clone(),
		}
	}
}

impl<M> Debug for ActorRef<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ActorRef").field(&self.path).finish()
	}
}

impl<M> PartialEq for ActorRef<M> {
	fn eq(&self, other: &Self) -> bool {
		self.path == other.path
	}
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.path.hash(state)
	}
}

impl<M: Send + 'static> ActorRef<M> {
	pub(crate) fn local(
		path: ActorPath,
		typed: Weak<dyn Deliver<M>>,
		any: Weak<dyn AnyTarget>,
		system: Weak<SystemShared>,
	) -> Self {
		Self {
			path,
			route: Route::Local { typed, any },
			system,
		}
	}

	pub(crate) fn remote(
		path: ActorPath,
		transport: Arc<dyn Transport>,
		system: Weak<SystemShared>,
	) -> Self {
		Self {
			path,
			route: Route::Remote(transport),
			system,
		}
	}

	/// Full path of the target, also its identity for equality and hashing.
	pub fn path(&self) -> &ActorPath {
		&self.path
	}

	/// Fire and forget.
	pub fn tell(&self, message: M, sender: Option<AnyRef>) {
		let envelope = Envelope::new(message, sender);
		match &self.route {
			Route::Local { typed, .. } => match typed.upgrade() {
				Some(cell) => cell.deliver(envelope),
				None => self.dead_letter(envelope, DeadLetterReason::Terminated),
			},
			Route::Remote(transport) => transport.deliver(&self.path, envelope.erase()),
			Route::Dead => self.dead_letter(envelope, DeadLetterReason::Unresolved),
		}
	}

	/// True once the local target terminated, or for a dead reference.
	/// Remote targets are never known to be terminated.
	pub fn is_terminated(&self) -> bool {
		match &self.route {
			Route::Local { any, .. } => any.upgrade().is_none_or(|cell| cell.is_terminated()),
			Route::Remote(_) => false,
			Route::Dead => true,
		}
	}

	/// Same target, payload type erased.
	pub fn to_any(&self) -> AnyRef {
		let route = match &self.route {
			Route::Local { any, .. } => AnyRoute::Local(any.clone()),
			Route::Remote(transport) => AnyRoute::Remote(transport.clone()),
			Route::Dead => AnyRoute::Dead,
		};
		AnyRef {
			path: self.path.clone(),
			route,
			system: self.system.clone(),
		}
	}

	pub(crate) fn system(&self) -> &Weak<SystemShared> {
		&self.system
	}

	fn dead_letter(&self, envelope: Envelope<M>, reason: DeadLetterReason) {
		publish_dead_letter(&self.system, &self.path, envelope.erase(), reason);
	}
}

#[derive(Clone)]
enum AnyRoute {
	Local(Weak<dyn AnyTarget>),
	Remote(Arc<dyn Transport>),
	Dead,
}

/// Untyped reference: message senders, watchers, path selection. A payload
/// of a type the recipient does not accept is dead-lettered.
#[derive(Clone)]
pub struct AnyRef {
	path: ActorPath,
	route: AnyRoute,
	system: Weak<SystemShared>,
}

impl Debug for AnyRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("AnyRef").field(&self.path).finish()
	}
}

impl PartialEq for AnyRef {
	fn eq(&self, other: &Self) -> bool {
		self.path == other.path
	}
}

impl Eq for AnyRef {}

impl Hash for AnyRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.path.hash(state)
	}
}

impl AnyRef {
	pub(crate) fn local(path: ActorPath, target: Weak<dyn AnyTarget>, system: Weak<SystemShared>) -> Self {
		Self {
			path,
			route: AnyRoute::Local(target),
			system,
		}
	}

	pub(crate) fn remote(path: ActorPath, transport: Arc<dyn Transport>, system: Weak<SystemShared>) -> Self {
		Self {
			path,
			route: AnyRoute::Remote(transport),
			system,
		}
	}

	pub(crate) fn dead(path: ActorPath, system: Weak<SystemShared>) -> Self {
		Self {
			path,
			route: AnyRoute::Dead,
			system,
		}
	}

	/// Full path of the target, also its identity for equality and hashing.
	pub fn path(&self) -> &ActorPath {
		&self.path
	}

	/// Fire and forget. A payload the target does not accept is dead-lettered
	/// with [`DeadLetterReason::TypeMismatch`].
	pub fn tell<T: Send + 'static>(&self, message: T, sender: Option<AnyRef>) {
		self.tell_boxed(Box::new(message), sender)
	}

	pub(crate) fn tell_boxed(&self, message: Box<dyn Any + Send>, sender: Option<AnyRef>) {
		match &self.route {
			AnyRoute::Local(target) => match target.upgrade() {
				Some(target) => target.deliver_any(message, sender),
				None => publish_dead_letter(
					&self.system,
					&self.path,
					Envelope::new(message, sender),
					DeadLetterReason::Terminated,
				),
			},
			AnyRoute::Remote(transport) => {
				transport.deliver(&self.path, Envelope::new(message, sender))
			}
			AnyRoute::Dead => publish_dead_letter(
				&self.system,
				&self.path,
				Envelope::new(message, sender),
				DeadLetterReason::Unresolved,
			),
		}
	}

	/// See [`ActorRef::is_terminated`].
	pub fn is_terminated(&self) -> bool {
		match &self.route {
			AnyRoute::Local(target) => target.upgrade().is_none_or(|t| t.is_terminated()),
			AnyRoute::Remote(_) => false,
			AnyRoute::Dead => true,
		}
	}

	/// Whether sends go through the configured transport.
	pub fn is_remote(&self) -> bool {
		matches!(self.route, AnyRoute::Remote(_))
	}

	/// System messages are local only; a remote target accepts and drops
	/// them.
	pub(crate) fn send_system(&self, message: SystemMessage) -> Result<(), SystemMessage> {
		match &self.route {
			AnyRoute::Local(target) => match target.upgrade() {
				Some(target) => target.send_system(message),
				None => Err(message),
			},
			AnyRoute::Remote(_) => {
				tracing::debug!(path = %self.path, ?message, "system message to remote actor dropped");
				Ok(())
			}
			AnyRoute::Dead => Err(message),
		}
	}
}

/// Anything that names an actor: used wherever the runtime only needs to
/// stop or watch the target.
pub trait Addressable {
	fn any_ref(&self) -> AnyRef;
}

impl<M: Send + 'static> Addressable for ActorRef<M> {
	fn any_ref(&self) -> AnyRef {
		self.to_any()
	}
}

impl Addressable for AnyRef {
	fn any_ref(&self) -> AnyRef {
		self.clone()
	}
}

pub(crate) fn publish_dead_letter(
	system: &Weak<SystemShared>,
	recipient: &ActorPath,
	envelope: Envelope<Box<dyn Any + Send>>,
	reason: DeadLetterReason,
) {
	let letter = DeadLetter {
		recipient: recipient.clone(),
		envelope,
		reason,
	};
	match system.upgrade() {
		Some(system) => system.dead_letters.publish(letter),
		None => tracing::debug!(recipient = %letter.recipient, reason = %letter.reason, "dead letter after system shutdown"),
	}
}
