use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SystemError;
use crate::supervision::Directive;

/// Dispatcher used by every actor whose `Props` name none.
pub const DEFAULT_DISPATCHER: &str = "default";

/// Sizing of one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
	/// Number of worker tasks sharing this dispatcher's run-queue.
	pub pool_size: usize,
	/// Messages one cell may process per turn before it yields.
	pub throughput: usize,
	/// Optional wall-clock cap on a single turn.
	pub throughput_deadline: Option<Duration>,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			pool_size: std::thread::available_parallelism()
				.map(|n| n.get())
				.unwrap_or(4),
			throughput: 5,
			throughput_deadline: None,
		}
	}
}

impl DispatcherConfig {
	/// Must be at least 1.
	pub fn with_pool_size(mut self, pool_size: usize) -> Self {
		self.pool_size = pool_size;
		self
	}

	/// Must be at least 1.
	pub fn with_throughput(mut self, throughput: usize) -> Self {
		self.throughput = throughput;
		self
	}

	/// Ends a turn once it ran for `deadline`, even below `throughput`.
	pub fn with_throughput_deadline(mut self, deadline: Duration) -> Self {
		self.throughput_deadline = Some(deadline);
		self
	}

	fn validate(&self, name: &str) -> Result<(), SystemError> {
		if self.pool_size == 0 {
			return Err(SystemError::InvalidConfig(format!(
				"dispatcher `{name}`: pool_size must be at least 1"
			)));
		}
		if self.throughput == 0 {
			return Err(SystemError::InvalidConfig(format!(
				"dispatcher `{name}`: throughput must be at least 1"
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailboxConfig {
	#[default]
	Unbounded,
	Bounded {
		capacity: usize,
	},
}

impl MailboxConfig {
	/// A mailbox that dead-letters user messages beyond `capacity`.
	pub fn bounded(capacity: usize) -> Self {
		Self::Bounded { capacity }
	}

	pub(crate) fn capacity(&self) -> Option<usize> {
		match self {
			Self::Unbounded => None,
			Self::Bounded { capacity } => Some(*capacity),
		}
	}

	pub(crate) fn validate(&self) -> Result<(), SystemError> {
		match self {
			Self::Bounded { capacity: 0 } => Err(SystemError::InvalidConfig(
				"bounded mailbox capacity must be at least 1".into(),
			)),
			_ => Ok(()),
		}
	}
}

/// Strategy used for top-level actors and for every actor that does not
/// provide its own strategy for its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionConfig {
	/// `None` means unlimited.
	pub max_restarts: Option<u32>,
	/// `None` counts restarts over the whole lifetime of the child.
	pub within: Option<Duration>,
	/// Directive for failures no rule matches.
	pub default_directive: Directive,
}

impl Default for SupervisionConfig {
	fn default() -> Self {
		Self {
			max_restarts: None,
			within: None,
			default_directive: Directive::Restart,
		}
	}
}

impl SupervisionConfig {
	/// Restarts allowed within the window before the child is stopped.
	pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
		self.max_restarts = Some(max_restarts);
		self
	}

	/// Sliding window for `max_restarts`.
	pub fn within(mut self, window: Duration) -> Self {
		self.within = Some(window);
		self
	}

	/// See [`SupervisionConfig::default_directive`].
	pub fn with_default_directive(mut self, directive: Directive) -> Self {
		self.default_directive = directive;
		self
	}
}

/// Everything an [`crate::ActorSystem`] is built from.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
	/// The `default` dispatcher.
	pub default_dispatcher: DispatcherConfig,
	/// Additional named dispatchers.
	pub dispatchers: BTreeMap<String, DispatcherConfig>,
	/// Strategy for top-level actors and for actors without their own.
	pub supervision: SupervisionConfig,
	/// Mailbox of actors whose `Props` set none.
	pub mailbox: MailboxConfig,
}

impl SystemConfig {
	/// Replaces the `default` dispatcher's sizing.
	pub fn with_default_dispatcher(mut self, config: DispatcherConfig) -> Self {
		self.default_dispatcher = config;
		self
	}

	/// Adds a named dispatcher; the name `default` replaces the default one.
	pub fn with_dispatcher(mut self, name: impl Into<String>, config: DispatcherConfig) -> Self {
		let name = name.into();
		if name == DEFAULT_DISPATCHER {
			self.default_dispatcher = config;
		} else {
			self.dispatchers.insert(name, config);
		}
		self
	}

	/// Replaces the system-wide supervision defaults.
	pub fn with_supervision(mut self, supervision: SupervisionConfig) -> Self {
		self.supervision = supervision;
		self
	}

	/// Default mailbox for every actor.
	pub fn with_mailbox(mut self, mailbox: MailboxConfig) -> Self {
		self.mailbox = mailbox;
		self
	}

	/// Checked by [`crate::ActorSystemBuilder::build`]; rejects empty pools,
	/// zero throughput and zero-capacity mailboxes.
	pub fn validate(&self) -> Result<(), SystemError> {
		self.default_dispatcher.validate(DEFAULT_DISPATCHER)?;
		for (name, config) in &self.dispatchers {
			config.validate(name)?;
		}
		self.mailbox.validate()
	}
}
