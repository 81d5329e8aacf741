use std::fmt;

use crate::actor_ref::AnyRef;
use crate::path::ActorId;
use crate::path::ActorPath;
use crate::supervision::Failure;

/// Control messages. They travel through the system queue of a mailbox and
/// are always handled before any pending user message.
pub(crate) enum SystemMessage {
	/// Build the actor instance and run `pre_start`.
	Create,
	Stop,
	/// The parent resolved an escalation with Resume.
	Resume,
	/// A child escalated; the receiver handles `failure` as its own.
	Failed { child: ActorId, failure: Failure },
	ChildTerminated { child: ActorId },
	Watch { watcher: AnyRef },
	Unwatch { watcher: ActorPath },
	/// Death-watch notification for the watcher.
	Terminated { actor: ActorPath },
}

impl fmt::Debug for SystemMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Create => f.write_str("Create"),
			Self::Stop => f.write_str("Stop"),
			Self::Resume => f.write_str("Resume"),
			Self::Failed { child, failure } => write!(f, "Failed({child}, {failure})"),
			Self::ChildTerminated { child } => write!(f, "ChildTerminated({child})"),
			Self::Watch { watcher } => write!(f, "Watch({})", watcher.path()),
			Self::Unwatch { watcher } => write!(f, "Unwatch({watcher})"),
			Self::Terminated { actor } => write!(f, "Terminated({actor})"),
		}
	}
}
