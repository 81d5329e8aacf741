use std::time::Duration;

use crate::path::ActorPath;

/// Failures raised by the runtime itself while running an actor.
#[derive(thiserror::Error, Debug)]
pub enum ActorError {
	#[error("actor panicked: {0}")]
	Panicked(String),

	#[error("restart limit exceeded: {restarts} restarts within {within:?}")]
	RestartLimitExceeded {
		restarts: usize,
		within: Option<Duration>,
	},

	#[error("supervisor strategy panicked while deciding")]
	DeciderPanicked,

	#[error("Actor is already dead")]
	Dead,
}

#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
	#[error("invalid actor name `{0}`")]
	InvalidName(String),

	#[error("actor name is not unique: {0}")]
	DuplicateName(ActorPath),

	#[error("unknown dispatcher `{0}`")]
	UnknownDispatcher(String),

	#[error("bounded mailbox capacity must be at least 1")]
	InvalidMailbox,

	#[error("parent {0} is terminating")]
	ParentTerminating(ActorPath),

	#[error("actor system is shutting down")]
	SystemShutdown,
}

/// Outcome of `ask` and death watch for the asking side only; the target
/// never observes these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AskError {
	#[error("ask timed out after {0:?}")]
	Timeout(Duration),

	#[error("unexpected reply, expected {expected}")]
	UnexpectedReply { expected: &'static str },

	#[error("actor system is shutting down")]
	SystemShutdown,
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
	#[error("an actor system must be built inside a tokio runtime")]
	NoRuntime,

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}
