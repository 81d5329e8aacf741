//! The actor cell: one actor's mailbox, lifecycle state machine and the
//! turn a dispatcher worker runs for it.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Instant;

use downcast_rs::DowncastSync;
use downcast_rs::impl_downcast;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::Instrument;

use crate::actor::Actor;
use crate::actor::Props;
use crate::actor::receive_default;
use crate::actor_ref::ActorRef;
use crate::actor_ref::AnyRef;
use crate::actor_ref::AnyTarget;
use crate::actor_ref::Deliver;
use crate::config::MailboxConfig;
use crate::context::Context;
use crate::dead_letter::DeadLetter;
use crate::dead_letter::DeadLetterReason;
use crate::dispatcher::Dispatcher;
use crate::envelope::Envelope;
use crate::error::ActorError;
use crate::error::panic_message;
use crate::mailbox::EnqueueError;
use crate::mailbox::Mailbox;
use crate::mailbox::MailboxStatus;
use crate::path::ActorId;
use crate::path::ActorPath;
use crate::run_queue::Schedulable;
use crate::supervision::Directive;
use crate::supervision::Failure;
use crate::supervision::RestartStats;
use crate::supervision::SupervisorStrategy;
use crate::system::ActorSystem;
use crate::system::SystemShared;
use crate::system_message::SystemMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
	New = 0,
	Starting = 1,
	Running = 2,
	/// Escalated a failure and waits for its parent's decision.
	Suspended = 3,
	Restarting = 4,
	Stopping = 5,
	Terminated = 6,
}

impl Lifecycle {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::New,
			1 => Self::Starting,
			2 => Self::Running,
			3 => Self::Suspended,
			4 => Self::Restarting,
			5 => Self::Stopping,
			_ => Self::Terminated,
		}
	}
}

/// Work parked until every child, started or still starting, reported
/// termination.
enum Pending {
	Restart(Failure),
	Terminate,
}

struct CellState<A: Actor> {
	actor: Option<A>,
	ctx: Context<A>,
	restarts: RestartStats,
	pending: Option<Pending>,
	/// Watch notifications received while not running.
	deferred: VecDeque<ActorPath>,
}

/// Type-erased view of a cell kept in the system arena.
pub(crate) trait CellEntry: AnyTarget + DowncastSync {
	fn path(&self) -> &ActorPath;
	fn any_ref(&self) -> AnyRef;
	fn lifecycle(&self) -> Lifecycle;
}

impl_downcast!(sync CellEntry);

pub(crate) struct CellCore<A: Actor> {
	id: ActorId,
	path: ActorPath,
	parent: Option<ActorId>,
	me: Weak<Self>,
	mailbox: Mailbox<A::Message>,
	scheduled: AtomicBool,
	lifecycle: AtomicU8,
	dispatcher: Dispatcher,
	system: Arc<SystemShared>,
	/// The parent's strategy, deciding this cell's failures.
	supervisor: Arc<SupervisorStrategy>,
	props: Props<A>,
	span: tracing::Span,
	// only ever locked by the worker holding `scheduled`
	state: tokio::sync::Mutex<CellState<A>>,
}

pub(crate) struct CellParams<A: Actor> {
	pub id: ActorId,
	pub path: ActorPath,
	pub parent: Option<ActorId>,
	pub dispatcher: Dispatcher,
	pub supervisor: Arc<SupervisorStrategy>,
	pub props: Props<A>,
	pub mailbox: MailboxConfig,
}

impl<A: Actor> CellCore<A> {
	pub fn new(system: Arc<SystemShared>, params: CellParams<A>) -> Arc<Self> {
		let CellParams {
			id,
			path,
			parent,
			dispatcher,
			supervisor,
			props,
			mailbox,
		} = params;
		let span = A::span(&path);
		let strategy = A::supervisor_strategy()
			.map(Arc::new)
			.unwrap_or_else(|| system.default_strategy.clone());

		Arc::new_cyclic(|me: &Weak<Self>| {
			let typed: Weak<dyn Deliver<A::Message>> = me.clone();
			let any: Weak<dyn AnyTarget> = me.clone();
			let myself = ActorRef::local(path.clone(), typed, any, Arc::downgrade(&system));
			let ctx = Context::new(
				myself,
				id,
				ActorSystem::from_shared(system.clone()),
				strategy,
				span.clone(),
			);

			Self {
				id,
				path,
				parent,
				me: me.clone(),
				mailbox: Mailbox::new(mailbox),
				scheduled: AtomicBool::new(false),
				lifecycle: AtomicU8::new(Lifecycle::New as u8),
				dispatcher,
				system,
				supervisor,
				props,
				span,
				state: tokio::sync::Mutex::new(CellState {
					actor: None,
					ctx,
					restarts: RestartStats::default(),
					pending: None,
					deferred: VecDeque::new(),
				}),
			}
		})
	}

	pub fn actor_ref(&self) -> ActorRef<A::Message> {
		let typed: Weak<dyn Deliver<A::Message>> = self.me.clone();
		let any: Weak<dyn AnyTarget> = self.me.clone();
		ActorRef::local(self.path.clone(), typed, any, Arc::downgrade(&self.system))
	}

	fn current(&self) -> Lifecycle {
		Lifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
	}

	fn set_lifecycle(&self, lifecycle: Lifecycle) {
		tracing::debug!(path = %self.path, ?lifecycle, "lifecycle");
		self.lifecycle.store(lifecycle as u8, Ordering::SeqCst);
	}

	fn is_stopping(&self) -> bool {
		matches!(self.current(), Lifecycle::Stopping | Lifecycle::Terminated)
	}

	fn accepts_user(&self) -> bool {
		self.current() == Lifecycle::Running && self.mailbox.status() == MailboxStatus::Open
	}

	fn schedule(&self) {
		if !self.mailbox.has_pending() {
			return;
		}
		if let Some(me) = self.me.upgrade() {
			self.dispatcher.schedule(me);
		}
	}

	fn dead_letter(&self, envelope: Envelope<Box<dyn Any + Send>>, reason: DeadLetterReason) {
		self.system.dead_letters.publish(DeadLetter {
			recipient: self.path.clone(),
			envelope,
			reason,
		});
	}

	fn send_self(&self, message: SystemMessage) {
		let _ = AnyTarget::send_system(self, message);
	}

	fn send_parent(&self, message: SystemMessage) -> Result<(), SystemMessage> {
		let Some(parent) = self.parent else {
			return Err(message);
		};
		match self.system.cell(parent) {
			Some(cell) => cell.send_system(message),
			None => Err(message),
		}
	}

	/// Envelopes taken out of the mailbox but not processed: back to the
	/// head, or to dead letters once the mailbox closed.
	fn return_unprocessed(&self, envelopes: impl Iterator<Item = Envelope<A::Message>>) {
		if self.mailbox.status() == MailboxStatus::Closed {
			for envelope in envelopes {
				self.dead_letter(envelope.erase(), DeadLetterReason::Terminated);
			}
		} else {
			self.mailbox.requeue_front(envelopes.collect());
		}
	}

	/// One scheduling turn: system messages first, then at most
	/// `throughput` user messages. A system message arriving mid-turn
	/// preempts the rest of the batch.
	async fn turn(self: Arc<Self>) {
		let mut state = self.state.lock().await;
		let throughput = self.dispatcher.throughput();
		let deadline = self
			.dispatcher
			.throughput_deadline()
			.map(|deadline| Instant::now() + deadline);
		let past_deadline = || deadline.is_some_and(|deadline| Instant::now() >= deadline);

		let mut processed = 0;
		let mut rounds = 0;
		loop {
			rounds += 1;
			let batch = self.mailbox.dequeue_batch(throughput - processed);
			for message in batch.system {
				self.handle_system(&mut state, message).await;
			}
			self.flush_deferred(&mut state).await;

			let mut user = batch.user.into_iter();
			while let Some(envelope) = user.next() {
				if !self.accepts_user() {
					self.return_unprocessed(std::iter::once(envelope).chain(user.by_ref()));
					break;
				}
				self.process_one(&mut state, envelope).await;
				processed += 1;
				if self.mailbox.has_system() || past_deadline() {
					self.return_unprocessed(user.by_ref());
					break;
				}
			}

			if self.current() == Lifecycle::Terminated
				|| processed >= throughput
				|| rounds >= throughput
				|| past_deadline()
				|| !self.mailbox.has_pending()
				|| (!self.accepts_user() && !self.mailbox.has_system())
			{
				break;
			}
		}
	}

	async fn process_one(&self, state: &mut CellState<A>, envelope: Envelope<A::Message>) {
		let CellState { actor, ctx, .. } = &mut *state;
		let Some(actor) = actor.as_mut() else {
			self.return_unprocessed(std::iter::once(envelope));
			return;
		};

		let (message, sender) = envelope.split();
		ctx.sender = sender;
		let behavior = ctx.behavior.unwrap_or(receive_default::<A>);
		let outcome = AssertUnwindSafe(behavior(actor, ctx, message))
			.catch_unwind()
			.await;
		ctx.sender = None;
		metrics::counter!("runy.messages.processed").increment(1);

		if let Some(failure) = Failure::from_outcome(outcome) {
			self.handle_failure(state, failure).await;
		}
	}

	async fn handle_system(&self, state: &mut CellState<A>, message: SystemMessage) {
		tracing::trace!(path = %self.path, ?message, "system message");
		match message {
			SystemMessage::Create => match state.pending.take() {
				Some(Pending::Restart(failure)) if state.ctx.children.is_empty() => {
					self.finish_restart(state, failure).await
				}
				Some(pending) => state.pending = Some(pending),
				None if self.current() == Lifecycle::New => self.create(state).await,
				None => {}
			},
			SystemMessage::Stop => self.initiate_stop(state).await,
			SystemMessage::Resume => {
				if self.current() == Lifecycle::Suspended {
					if state.actor.is_none() {
						// escalated from a failed factory: there is no instance to resume
						self.restart(state, Failure::new(ActorError::Dead.into())).await;
						return;
					}
					self.enter_running(state);
					self.resume_children(state);
				}
			}
			SystemMessage::Failed { child, failure } => {
				tracing::debug!(path = %self.path, %child, cause = %failure, "child escalated");
				self.handle_failure(state, failure).await;
			}
			SystemMessage::ChildTerminated { child } => {
				state.ctx.children.retain(|c| c.id != child);
				self.check_pending(state).await;
			}
			SystemMessage::Watch { watcher } => {
				if !state.ctx.watchers.iter().any(|w| w.path() == watcher.path()) {
					state.ctx.watchers.push(watcher);
				}
			}
			SystemMessage::Unwatch { watcher } => {
				state.ctx.watchers.retain(|w| w.path() != &watcher);
			}
			SystemMessage::Terminated { actor } => {
				if state.ctx.watching.remove(&actor) {
					state.deferred.push_back(actor);
				}
			}
		}
	}

	/// Delivers queued watch notifications while the actor runs.
	async fn flush_deferred(&self, state: &mut CellState<A>) {
		while self.current() == Lifecycle::Running {
			let Some(actor) = state.deferred.pop_front() else {
				break;
			};
			let CellState { actor: instance, ctx, .. } = &mut *state;
			let Some(instance) = instance.as_mut() else {
				break;
			};
			let outcome = AssertUnwindSafe(instance.on_terminated(ctx, actor))
				.catch_unwind()
				.await;
			if let Some(failure) = Failure::from_outcome(outcome) {
				self.handle_failure(state, failure).await;
			}
		}
	}

	async fn create(&self, state: &mut CellState<A>) {
		self.set_lifecycle(Lifecycle::Starting);
		match self.start_instance(state, None).await {
			None => self.enter_running(state),
			Some(failure) => self.handle_failure(state, failure).await,
		}
	}

	/// Builds a fresh instance and runs `pre_start`, or `post_restart` when
	/// replacing a failed one. The instance is kept even if the hook fails.
	async fn start_instance(&self, state: &mut CellState<A>, restart: Option<&Failure>) -> Option<Failure> {
		let props = &self.props;
		let mut instance = match std::panic::catch_unwind(AssertUnwindSafe(|| props.produce())) {
			Ok(instance) => instance,
			Err(payload) => return Some(Failure::from_panic(payload)),
		};

		let ctx = &mut state.ctx;
		let outcome = match restart {
			None => AssertUnwindSafe(instance.pre_start(ctx)).catch_unwind().await,
			Some(failure) => {
				AssertUnwindSafe(instance.post_restart(ctx, failure))
					.catch_unwind()
					.await
			}
		};
		state.actor = Some(instance);
		Failure::from_outcome(outcome)
	}

	fn enter_running(&self, state: &mut CellState<A>) {
		if self.is_stopping() {
			return;
		}
		self.set_lifecycle(Lifecycle::Running);
		self.mailbox.resume();
	}

	fn handle_failure<'a>(&'a self, state: &'a mut CellState<A>, failure: Failure) -> BoxFuture<'a, ()> {
		async move {
			if self.is_stopping() {
				tracing::warn!(path = %self.path, cause = %failure, "failure while stopping ignored");
				return;
			}
			metrics::counter!("runy.actor.failures").increment(1);
			tracing::error!(path = %self.path, cause = %failure, "actor failed");

			let directive = match self.supervisor.decide_guarded(&failure) {
				// nothing to resume when the factory itself failed
				Directive::Resume if state.actor.is_none() => Directive::Restart,
				directive => directive,
			};
			match directive {
				Directive::Resume => {
					self.enter_running(state);
					self.resume_children(state);
				}
				Directive::Restart => {
					if state.restarts.request_restart(&self.supervisor, Instant::now()) {
						self.restart(state, failure).await;
					} else {
						let exceeded = ActorError::RestartLimitExceeded {
							restarts: state.restarts.count(),
							within: self.supervisor.within_time_range(),
						};
						tracing::error!(path = %self.path, cause = %failure, "{exceeded}");
						self.initiate_stop(state).await;
					}
				}
				Directive::Stop => self.initiate_stop(state).await,
				Directive::Escalate if self.parent.is_some() => {
					self.set_lifecycle(Lifecycle::Suspended);
					self.mailbox.suspend();
					let escalated = SystemMessage::Failed {
						child: self.id,
						failure,
					};
					if self.send_parent(escalated).is_err() {
						self.initiate_stop(state).await;
					}
				}
				Directive::Escalate => {
					tracing::warn!(path = %self.path, "top-level actor escalated, stopping");
					self.initiate_stop(state).await;
				}
			}
		}
		.boxed()
	}

	/// Discards the failed instance and stops the children; the new
	/// instance is built once they are gone. Queued user messages survive.
	async fn restart(&self, state: &mut CellState<A>, failure: Failure) {
		metrics::counter!("runy.actor.restarts").increment(1);
		self.set_lifecycle(Lifecycle::Restarting);
		self.mailbox.suspend();

		let CellState { actor, ctx, .. } = &mut *state;
		if let Some(mut instance) = actor.take() {
			let hook = AssertUnwindSafe(instance.pre_restart(ctx, &failure))
				.catch_unwind()
				.await;
			if let Err(payload) = hook {
				tracing::warn!(path = %self.path, panic = %panic_message(&*payload), "pre_restart panicked");
			}
		}
		ctx.behavior = None;

		let live = self.stop_children(state);
		state.pending = Some(Pending::Restart(failure));
		if live == 0 {
			self.send_self(SystemMessage::Create);
		}
	}

	async fn finish_restart(&self, state: &mut CellState<A>, failure: Failure) {
		if self.is_stopping() {
			return;
		}
		match self.start_instance(state, Some(&failure)).await {
			None => {
				tracing::debug!(path = %self.path, restarts = state.restarts.count(), "restarted");
				self.enter_running(state);
			}
			Some(failure) => self.handle_failure(state, failure).await,
		}
	}

	async fn initiate_stop(&self, state: &mut CellState<A>) {
		if self.is_stopping() {
			return;
		}
		self.set_lifecycle(Lifecycle::Stopping);
		state.ctx.terminating = true;
		state.deferred.clear();

		self.mailbox.close();
		for envelope in self.mailbox.drain_user() {
			self.dead_letter(envelope.erase(), DeadLetterReason::Terminated);
		}

		let live = self.stop_children(state);
		state.pending = Some(Pending::Terminate);
		if live == 0 {
			self.finish_terminate(state).await;
		}
	}

	/// Sends `Stop` to every child and returns how many must be waited
	/// for, children still in `pre_start` included.
	fn stop_children(&self, state: &CellState<A>) -> usize {
		for child in &state.ctx.children {
			let _ = child.any.send_system(SystemMessage::Stop);
		}
		state.ctx.children.len()
	}

	fn resume_children(&self, state: &CellState<A>) {
		for child in &state.ctx.children {
			let _ = child.any.send_system(SystemMessage::Resume);
		}
	}

	async fn check_pending(&self, state: &mut CellState<A>) {
		if !state.ctx.children.is_empty() {
			return;
		}
		match state.pending {
			Some(Pending::Terminate) => self.finish_terminate(state).await,
			Some(Pending::Restart(_)) => self.send_self(SystemMessage::Create),
			None => {}
		}
	}

	async fn finish_terminate(&self, state: &mut CellState<A>) {
		if self.current() == Lifecycle::Terminated {
			return;
		}
		state.pending = None;

		let CellState { actor, ctx, .. } = &mut *state;
		if let Some(mut instance) = actor.take() {
			let hook = AssertUnwindSafe(instance.post_stop(ctx)).catch_unwind().await;
			if let Err(payload) = hook {
				tracing::warn!(path = %self.path, panic = %panic_message(&*payload), "post_stop panicked");
			}
		}
		self.set_lifecycle(Lifecycle::Terminated);

		// watches that raced with termination still get their notification
		for message in self.mailbox.close_system() {
			if let SystemMessage::Watch { watcher } = message {
				if !ctx.watchers.iter().any(|w| w.path() == watcher.path()) {
					ctx.watchers.push(watcher);
				}
			}
		}
		// unregistered before anyone hears about it, so the name is free
		// once a watcher is notified
		self.system.unregister(self.id, &self.path);
		metrics::counter!("runy.actor.stopped").increment(1);
		tracing::debug!(path = %self.path, "terminated");

		for watcher in ctx.watchers.drain(..) {
			let _ = watcher.send_system(SystemMessage::Terminated {
				actor: self.path.clone(),
			});
		}
		ctx.watching.clear();

		match self.parent {
			Some(_) => {
				let _ = self.send_parent(SystemMessage::ChildTerminated { child: self.id });
			}
			None => self.system.top_level_terminated(self.id),
		}
	}
}

impl<A: Actor> Schedulable for CellCore<A> {
	fn scheduled(&self) -> &AtomicBool {
		&self.scheduled
	}

	fn has_pending(&self) -> bool {
		self.mailbox.has_pending()
	}

	fn run(self: Arc<Self>) -> BoxFuture<'static, ()> {
		let span = self.span.clone();
		self.turn().instrument(span).boxed()
	}

	fn path(&self) -> &ActorPath {
		&self.path
	}
}

impl<A: Actor> AnyTarget for CellCore<A> {
	fn deliver_any(&self, message: Box<dyn Any + Send>, sender: Option<AnyRef>) {
		match message.downcast::<A::Message>() {
			Ok(message) => self.deliver(Envelope::new(*message, sender)),
			Err(message) => self.dead_letter(Envelope::new(message, sender), DeadLetterReason::TypeMismatch),
		}
	}

	fn send_system(&self, message: SystemMessage) -> Result<(), SystemMessage> {
		self.mailbox.enqueue_system(message)?;
		self.schedule();
		Ok(())
	}

	fn is_terminated(&self) -> bool {
		self.current() == Lifecycle::Terminated
	}
}

impl<A: Actor> Deliver<A::Message> for CellCore<A> {
	fn deliver(&self, envelope: Envelope<A::Message>) {
		match self.mailbox.enqueue_user(envelope) {
			Ok(()) => self.schedule(),
			Err(EnqueueError::Full(envelope)) => {
				self.dead_letter(envelope.erase(), DeadLetterReason::MailboxFull)
			}
			Err(EnqueueError::Closed(envelope)) => {
				self.dead_letter(envelope.erase(), DeadLetterReason::Terminated)
			}
		}
	}
}

impl<A: Actor> CellEntry for CellCore<A> {
	fn path(&self) -> &ActorPath {
		&self.path
	}

	fn any_ref(&self) -> AnyRef {
		let target: Weak<dyn AnyTarget> = self.me.clone();
		AnyRef::local(self.path.clone(), target, Arc::downgrade(&self.system))
	}

	fn lifecycle(&self) -> Lifecycle {
		self.current()
	}
}
