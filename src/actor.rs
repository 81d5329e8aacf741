use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::MailboxConfig;
use crate::context::Context;
use crate::path::ActorPath;
use crate::supervision::Failure;
use crate::supervision::SupervisorStrategy;

/// A replaceable message handler, installed with [`Context::become_with`].
///
/// Any method shaped like
/// `fn(&'a mut A, &'a mut Context<A>, A::Message) -> BoxFuture<'a, anyhow::Result<()>>`
/// coerces to it.
pub type Receive<A> = for<'a> fn(
	&'a mut A,
	&'a mut Context<A>,
	<A as Actor>::Message,
) -> BoxFuture<'a, anyhow::Result<()>>;

/// The behaviour of one actor instance.
///
/// Messages are processed one at a time, in mailbox order; the runtime
/// never runs two hooks of the same actor concurrently. An `Err` returned
/// from any fallible hook, or a panic, is a failure handed to the parent's
/// supervisor strategy.
pub trait Actor: Sized + Send + 'static {
	type Message: Send + 'static;

	fn span(path: &ActorPath) -> tracing::Span {
		tracing::info_span!("actor", path = %path)
	}

	/// Strategy applied to this actor's children. `None` uses the system
	/// default from [`SupervisionConfig`](crate::SupervisionConfig).
	fn supervisor_strategy() -> Option<SupervisorStrategy> {
		None
	}

	fn pre_start(&mut self, _ctx: &mut Context<Self>) -> impl Future<Output = anyhow::Result<()>> + Send {
		futures::future::ready(Ok(()))
	}

	fn receive(
		&mut self,
		ctx: &mut Context<Self>,
		message: Self::Message,
	) -> impl Future<Output = anyhow::Result<()>> + Send;

	/// A watched actor terminated.
	fn on_terminated(
		&mut self,
		_ctx: &mut Context<Self>,
		_actor: ActorPath,
	) -> impl Future<Output = anyhow::Result<()>> + Send {
		futures::future::ready(Ok(()))
	}

	/// Runs on the failed instance before it is discarded.
	fn pre_restart(
		&mut self,
		_ctx: &mut Context<Self>,
		_failure: &Failure,
	) -> impl Future<Output = ()> + Send {
		futures::future::ready(())
	}

	/// Runs on the fresh instance after a restart, instead of `pre_start`.
	fn post_restart(
		&mut self,
		ctx: &mut Context<Self>,
		_failure: &Failure,
	) -> impl Future<Output = anyhow::Result<()>> + Send {
		self.pre_start(ctx)
	}

	fn post_stop(&mut self, _ctx: &mut Context<Self>) -> impl Future<Output = ()> + Send {
		futures::future::ready(())
	}
}

pub(crate) fn receive_default<'a, A: Actor>(
	actor: &'a mut A,
	ctx: &'a mut Context<A>,
	message: A::Message,
) -> BoxFuture<'a, anyhow::Result<()>> {
	Box::pin(actor.receive(ctx, message))
}

/// Recipe for an actor: the factory is invoked on start and again on every
/// restart.
pub struct Props<A: Actor> {
	factory: Arc<dyn Fn() -> A + Send + Sync>,
	dispatcher: Option<String>,
	mailbox: Option<MailboxConfig>,
}

impl<A: Actor> Clone for Props<A> {
	fn clone(&self) -> Self {
		Self {
			factory: self.factory.clone(),
			dispatcher: self.dispatcher.clone(),
			mailbox: self.mailbox,
		}
	}
}

impl<A: Actor> fmt::Debug for Props<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Props")
			.field("actor", &std::any::type_name::<A>())
			.field("dispatcher", &self.dispatcher)
			.field("mailbox", &self.mailbox)
			.finish()
	}
}

impl<A: Actor> Props<A> {
	/// `factory` builds a fresh instance on start and again on every restart.
	pub fn new(factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			factory: Arc::new(factory),
			dispatcher: None,
			mailbox: None,
		}
	}

	/// Runs the actor on a named dispatcher instead of the default one.
	pub fn with_dispatcher(mut self, name: impl Into<String>) -> Self {
		self.dispatcher = Some(name.into());
		self
	}

	/// Overrides the system default mailbox for this actor.
	pub fn with_mailbox(mut self, mailbox: MailboxConfig) -> Self {
		self.mailbox = Some(mailbox);
		self
	}

	pub(crate) fn dispatcher(&self) -> Option<&str> {
		self.dispatcher.as_deref()
	}

	pub(crate) fn mailbox(&self) -> Option<MailboxConfig> {
		self.mailbox
	}

	pub(crate) fn produce(&self) -> A {
		(self.factory)()
	}
}

impl<A: Actor + Default> Default for Props<A> {
	fn default() -> Self {
		Self::new(A::default)
	}
}
