//! Supervision: the failure type handed to strategies, the directives they
//! return, and the restart window that caps restarts.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::config::SupervisionConfig;
use crate::error::ActorError;
use crate::error::panic_message;

/// What a supervisor does with a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
	/// Drop the failed message and keep the current state.
	Resume,
	/// Discard the actor state (not the mailbox) and build a new instance.
	Restart,
	Stop,
	/// Fail the supervisor itself with the same cause.
	Escalate,
}

/// A failure raised while an actor processed a message or ran a lifecycle
/// hook. Cheap to clone; escalation hands the same failure upwards.
#[derive(Clone)]
pub struct Failure {
	cause: Arc<anyhow::Error>,
}

impl Failure {
	/// Wraps an error raised by an actor.
	pub fn new(cause: anyhow::Error) -> Self {
		Self {
			cause: Arc::new(cause),
		}
	}

	pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
		Self::new(ActorError::Panicked(panic_message(&*payload)).into())
	}

	/// Converts the outcome of a caught hook or handler invocation.
	pub(crate) fn from_outcome(
		outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
	) -> Option<Self> {
		match outcome {
			Ok(Ok(())) => None,
			Ok(Err(err)) => Some(Self::new(err)),
			Err(payload) => Some(Self::from_panic(payload)),
		}
	}

	/// Whether the cause is an `E`.
	pub fn is<E>(&self) -> bool
	where
		E: Display + Debug + Send + Sync + 'static,
	{
		self.cause.is::<E>()
	}

	/// The cause as an `E`, if it is one.
	pub fn downcast_ref<E>(&self) -> Option<&E>
	where
		E: Display + Debug + Send + Sync + 'static,
	{
		self.cause.downcast_ref::<E>()
	}

	/// The actor panicked instead of returning an error.
	pub fn is_panic(&self) -> bool {
		matches!(self.downcast_ref::<ActorError>(), Some(ActorError::Panicked(_)))
	}

	/// The underlying error.
	pub fn cause(&self) -> &anyhow::Error {
		&self.cause
	}
}

impl Display for Failure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&*self.cause, f)
	}
}

impl Debug for Failure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Debug::fmt(&*self.cause, f)
	}
}

type Matcher = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;
type Decider = Arc<dyn Fn(&Failure) -> Directive + Send + Sync>;

/// Maps a failure to a directive: rules are tried in order, the default
/// directive applies when none matches. Restart limits are independent of
/// the rules; either of them may be left unset.
#[derive(Clone)]
pub struct SupervisorStrategy {
	rules: Vec<(Matcher, Directive)>,
	decider: Option<Decider>,
	default_directive: Directive,
	max_restarts: Option<u32>,
	within: Option<Duration>,
}

impl SupervisorStrategy {
	/// No rules, no restart limit; every failure gets `default_directive`.
	pub fn new(default_directive: Directive) -> Self {
		Self {
			rules: Vec::new(),
			decider: None,
			default_directive,
			max_restarts: None,
			within: None,
		}
	}

	/// Applies `directive` to failures caused by an error of type `E`.
	pub fn on<E>(self, directive: Directive) -> Self
	where
		E: Display + Debug + Send + Sync + 'static,
	{
		self.when(|failure| failure.is::<E>(), directive)
	}

	/// Applies `directive` to panics.
	pub fn on_panic(self, directive: Directive) -> Self {
		self.when(Failure::is_panic, directive)
	}

	/// Appends a rule. Rules are checked in insertion order; the first
	/// match decides.
	pub fn when(
		mut self,
		matches: impl Fn(&Failure) -> bool + Send + Sync + 'static,
		directive: Directive,
	) -> Self {
		self.rules.push((Arc::new(matches), directive));
		self
	}

	/// Replaces the rule table with a function.
	pub fn with_decider(
		mut self,
		decider: impl Fn(&Failure) -> Directive + Send + Sync + 'static,
	) -> Self {
		self.decider = Some(Arc::new(decider));
		self
	}

	/// Caps restarts within the window; an extra restart becomes Stop.
	pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
		self.max_restarts = Some(max_restarts);
		self
	}

	/// Sliding window for `max_restarts`. Without it the cap counts the
	/// child's whole lifetime.
	pub fn within(mut self, window: Duration) -> Self {
		self.within = Some(window);
		self
	}

	/// `None` means unlimited.
	pub fn max_restarts(&self) -> Option<u32> {
		self.max_restarts
	}

	/// `None` means the whole lifetime.
	pub fn within_time_range(&self) -> Option<Duration> {
		self.within
	}

	/// Directive when no rule matches.
	pub fn default_directive(&self) -> Directive {
		self.default_directive
	}

	/// The decider if set, else the first matching rule, else the default.
	pub fn decide(&self, failure: &Failure) -> Directive {
		if let Some(decider) = &self.decider {
			return decider(failure);
		}
		self.rules
			.iter()
			.find(|(matches, _)| matches(failure))
			.map(|(_, directive)| *directive)
			.unwrap_or(self.default_directive)
	}

	/// A panicking decider stops the failed actor.
	pub(crate) fn decide_guarded(&self, failure: &Failure) -> Directive {
		match std::panic::catch_unwind(AssertUnwindSafe(|| self.decide(failure))) {
			Ok(directive) => directive,
			Err(payload) => {
				tracing::error!(
					cause = %failure,
					panic = %panic_message(&*payload),
					"{}",
					ActorError::DeciderPanicked
				);
				Directive::Stop
			}
		}
	}
}

impl Default for SupervisorStrategy {
	fn default() -> Self {
		Self::from(&SupervisionConfig::default())
	}
}

impl From<&SupervisionConfig> for SupervisorStrategy {
	fn from(config: &SupervisionConfig) -> Self {
		Self {
			rules: Vec::new(),
			decider: None,
			default_directive: config.default_directive,
			max_restarts: config.max_restarts,
			within: config.within,
		}
	}
}

impl Debug for SupervisorStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SupervisorStrategy")
			.field("rules", &self.rules.len())
			.field("decider", &self.decider.is_some())
			.field("default_directive", &self.default_directive)
			.field("max_restarts", &self.max_restarts)
			.field("within", &self.within)
			.finish()
	}
}

/// Sliding window of restart instants for one child.
#[derive(Debug, Default)]
pub(crate) struct RestartStats {
	history: VecDeque<Instant>,
}

impl RestartStats {
	/// Records a restart at `now` unless it would exceed the strategy's
	/// limit, in which case `false` is returned and nothing is recorded.
	pub fn request_restart(&mut self, strategy: &SupervisorStrategy, now: Instant) -> bool {
		let Some(max_restarts) = strategy.max_restarts else {
			return true;
		};

		if let Some(window) = strategy.within {
			while let Some(oldest) = self.history.front() {
				if now.saturating_duration_since(*oldest) > window {
					self.history.pop_front();
				} else {
					break;
				}
			}
		}

		if self.history.len() >= max_restarts as usize {
			return false;
		}
		self.history.push_back(now);
		true
	}

	pub fn count(&self) -> usize {
		self.history.len()
	}
}
