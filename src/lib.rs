mod actor;
mod actor_ref;
mod ask;
mod cell;
mod config;
mod context;
mod dead_letter;
mod dispatcher;
mod envelope;
mod error;
mod mailbox;
mod path;
mod persistence;
mod run_queue;
mod shutdown;
mod supervision;
mod system;
mod system_message;
mod transport;

pub mod prelude {
	pub use super::actor::Actor;
	pub use super::actor::Props;
	pub use super::actor_ref::ActorRef;
	pub use super::actor_ref::Addressable;
	pub use super::actor_ref::AnyRef;
	pub use super::context::Context;
	pub use super::supervision::Directive;
	pub use super::supervision::SupervisorStrategy;
	pub use super::system::ActorSystem;
}

pub use actor::Actor;
pub use actor::Props;
pub use actor::Receive;
pub use actor_ref::ActorRef;
pub use actor_ref::Addressable;
pub use actor_ref::AnyRef;
pub use cell::Lifecycle;
pub use config::DEFAULT_DISPATCHER;
pub use config::DispatcherConfig;
pub use config::MailboxConfig;
pub use config::SupervisionConfig;
pub use config::SystemConfig;
pub use context::Context;
pub use dead_letter::DeadLetter;
pub use dead_letter::DeadLetterReason;
pub use dead_letter::DeadLetterSink;
pub use dead_letter::LoggingDeadLetters;
pub use dispatcher::Dispatcher;
pub use envelope::Envelope;
pub use error::ActorError;
pub use error::AskError;
pub use error::SpawnError;
pub use error::SystemError;
pub use path::ActorId;
pub use path::ActorPath;
pub use persistence::InMemoryJournal;
pub use persistence::Journal;
pub use supervision::Directive;
pub use supervision::Failure;
pub use supervision::SupervisorStrategy;
pub use system::ActorSystem;
pub use system::ActorSystemBuilder;
pub use transport::Transport;
