use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;
use tokio::sync::oneshot;

use crate::actor::Actor;
use crate::actor::Props;
use crate::actor_ref::ActorRef;
use crate::actor_ref::Addressable;
use crate::actor_ref::AnyRef;
use crate::actor_ref::AnyTarget;
use crate::ask::TempEvent;
use crate::ask::TempRef;
use crate::ask::TempRegistration;
use crate::ask::await_termination;
use crate::cell::CellCore;
use crate::cell::CellEntry;
use crate::cell::CellParams;
use crate::cell::Lifecycle;
use crate::config::DEFAULT_DISPATCHER;
use crate::config::MailboxConfig;
use crate::config::SystemConfig;
use crate::dead_letter::DeadLetterSink;
use crate::dead_letter::DeadLetters;
use crate::dead_letter::LoggingDeadLetters;
use crate::dispatcher::Dispatcher;
use crate::error::AskError;
use crate::error::SpawnError;
use crate::error::SystemError;
use crate::path::ActorId;
use crate::path::ActorPath;
use crate::path::is_valid_name;
use crate::shutdown::ShutdownToken;
use crate::supervision::SupervisorStrategy;
use crate::system_message::SystemMessage;
use crate::transport::Transport;

pub(crate) struct Spawned<M> {
	pub id: ActorId,
	pub actor_ref: ActorRef<M>,
	pub any: AnyRef,
}

/// State shared by every handle of one actor system.
pub(crate) struct SystemShared {
	name: String,
	address: ActorPath,
	config: SystemConfig,
	dispatchers: HashMap<String, Dispatcher>,
	/// The cell arena. Parents and children refer to each other by id.
	cells: DashMap<ActorId, Arc<dyn CellEntry>>,
	paths: DashMap<ActorPath, ActorId>,
	top_level: DashMap<ActorId, ActorPath>,
	pub(crate) temps: DashMap<ActorPath, Arc<TempRef>>,
	next_id: AtomicU64,
	next_temp: AtomicU64,
	pub(crate) dead_letters: DeadLetters,
	transport: Option<Arc<dyn Transport>>,
	pub(crate) default_strategy: Arc<SupervisorStrategy>,
	shutdown: ShutdownToken,
	terminating: AtomicBool,
	top_level_empty: Notify,
}

impl SystemShared {
	fn user_root(&self) -> ActorPath {
		self.address.child("user")
	}

	fn next_id(&self) -> ActorId {
		ActorId(self.next_id.fetch_add(1, Ordering::Relaxed))
	}

	pub fn cell(&self, id: ActorId) -> Option<Arc<dyn CellEntry>> {
		self.cells.get(&id).map(|cell| cell.value().clone())
	}

	/// Registers a new cell and queues its `Create`. The path is reserved
	/// first so two concurrent spawns of the same name cannot both succeed.
	pub fn spawn_cell<A: Actor>(
		self: &Arc<Self>,
		props: Props<A>,
		path: ActorPath,
		parent: Option<ActorId>,
		supervisor: Arc<SupervisorStrategy>,
	) -> Result<Spawned<A::Message>, SpawnError> {
		if parent.is_none() && self.terminating.load(Ordering::SeqCst) {
			return Err(SpawnError::SystemShutdown);
		}

		let dispatcher_name = props.dispatcher().unwrap_or(DEFAULT_DISPATCHER);
		let dispatcher = self
			.dispatchers
			.get(dispatcher_name)
			.cloned()
			.ok_or_else(|| SpawnError::UnknownDispatcher(dispatcher_name.to_string()))?;
		let mailbox = props.mailbox().unwrap_or(self.config.mailbox);
		if mailbox == (MailboxConfig::Bounded { capacity: 0 }) {
			return Err(SpawnError::InvalidMailbox);
		}

		let id = self.next_id();
		match self.paths.entry(path.clone()) {
			Entry::Occupied(_) => return Err(SpawnError::DuplicateName(path)),
			Entry::Vacant(entry) => {
				entry.insert(id);
			}
		}

		let cell = CellCore::new(
			self.clone(),
			CellParams {
				id,
				path: path.clone(),
				parent,
				dispatcher,
				supervisor,
				props,
				mailbox,
			},
		);
		let spawned = Spawned {
			id,
			actor_ref: cell.actor_ref(),
			any: cell.any_ref(),
		};

		self.cells.insert(id, cell.clone());
		if parent.is_none() {
			self.top_level.insert(id, path.clone());
		}
		metrics::gauge!("runy.actors.live").set(self.cells.len() as f64);
		tracing::debug!(%path, %id, "spawned");

		let _ = cell.send_system(SystemMessage::Create);
		Ok(spawned)
	}

	pub fn unregister(&self, id: ActorId, path: &ActorPath) {
		self.cells.remove(&id);
		self.paths.remove_if(path, |_, owner| *owner == id);
		metrics::gauge!("runy.actors.live").set(self.cells.len() as f64);
	}

	pub fn top_level_terminated(&self, id: ActorId) {
		self.top_level.remove(&id);
		if self.top_level.is_empty() {
			self.top_level_empty.notify_waiters();
		}
	}

	/// A temporary reference under `/temp`, unregistered when the returned
	/// registration drops.
	pub fn register_temp(self: &Arc<Self>) -> (AnyRef, oneshot::Receiver<TempEvent>, TempRegistration) {
		let index = self.next_temp.fetch_add(1, Ordering::Relaxed);
		let path = self.address.child("temp").child(&format!("${index}"));
		let (temp, rx) = TempRef::new(path.clone());
		let target: Weak<dyn AnyTarget> = Arc::downgrade(&temp) as Weak<dyn AnyTarget>;
		self.temps.insert(path.clone(), temp);

		let reply_to = AnyRef::local(path.clone(), target, Arc::downgrade(self));
		(reply_to, rx, TempRegistration::new(self.clone(), path))
	}

	fn select(self: &Arc<Self>, path: &ActorPath) -> AnyRef {
		if path.address() != self.address.as_str() {
			return match &self.transport {
				Some(transport) => AnyRef::remote(path.clone(), transport.clone(), Arc::downgrade(self)),
				None => AnyRef::dead(path.clone(), Arc::downgrade(self)),
			};
		}
		if let Some(cell) = self.paths.get(path).and_then(|id| self.cell(*id)) {
			return cell.any_ref();
		}
		if let Some(temp) = self.temps.get(path) {
			let target: Weak<dyn AnyTarget> = Arc::downgrade(temp.value()) as Weak<dyn AnyTarget>;
			return AnyRef::local(path.clone(), target, Arc::downgrade(self));
		}
		AnyRef::dead(path.clone(), Arc::downgrade(self))
	}

	async fn wait_top_level_empty(&self) {
		loop {
			let notified = self.top_level_empty.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.top_level.is_empty() {
				return;
			}
			notified.await;
		}
	}
}

/// Handle to a running actor system. Cheap to clone.
///
/// Cells hold the system too, so it lives until [`ActorSystem::shutdown`]
/// has stopped every actor.
#[derive(Clone)]
pub struct ActorSystem {
	shared: Arc<SystemShared>,
}

impl fmt::Debug for ActorSystem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorSystem")
			.field("name", &self.shared.name)
			.field("actors", &self.shared.cells.len())
			.field("dispatchers", &self.shared.dispatchers.len())
			.finish()
	}
}

impl ActorSystem {
	/// A system with the default configuration.
	pub fn new(name: &str) -> Result<Self, SystemError> {
		Self::builder(name).build()
	}

	/// Starts configuring a system named `name`; nothing runs until
	/// [`ActorSystemBuilder::build`].
	pub fn builder(name: &str) -> ActorSystemBuilder {
		ActorSystemBuilder {
			name: name.to_string(),
			config: SystemConfig::default(),
			dead_letters: None,
			transport: None,
		}
	}

	pub(crate) fn from_shared(shared: Arc<SystemShared>) -> Self {
		Self { shared }
	}

	pub(crate) fn shared(&self) -> &Arc<SystemShared> {
		&self.shared
	}

	/// The name given at build time, also the address part of every path.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// `runy://<name>`
	pub fn address(&self) -> &ActorPath {
		&self.shared.address
	}

	/// Configuration the system was built with.
	pub fn config(&self) -> &SystemConfig {
		&self.shared.config
	}

	/// Spawns a top-level actor at `/user/<name>`, supervised with the
	/// system default strategy.
	pub fn spawn<A: Actor>(&self, props: Props<A>, name: &str) -> Result<ActorRef<A::Message>, SpawnError> {
		if !is_valid_name(name) {
			return Err(SpawnError::InvalidName(name.to_string()));
		}
		self.spawn_top_level(props, self.shared.user_root().child(name))
	}

	/// Spawns a top-level actor under a generated `$n` name.
	pub fn spawn_anonymous<A: Actor>(&self, props: Props<A>) -> Result<ActorRef<A::Message>, SpawnError> {
		let name = format!("${}", self.shared.next_temp.fetch_add(1, Ordering::Relaxed));
		self.spawn_top_level(props, self.shared.user_root().child(&name))
	}

	fn spawn_top_level<A: Actor>(
		&self,
		props: Props<A>,
		path: ActorPath,
	) -> Result<ActorRef<A::Message>, SpawnError> {
		let strategy = self.shared.default_strategy.clone();
		self.shared
			.spawn_cell(props, path, None, strategy)
			.map(|spawned| spawned.actor_ref)
	}

	/// Asynchronous stop: returns immediately.
	pub fn stop(&self, target: &impl Addressable) {
		let _ = target.any_ref().send_system(SystemMessage::Stop);
	}

	/// Stops `target` and waits until it and all of its descendants have
	/// terminated.
	pub async fn graceful_stop(&self, target: &impl Addressable, timeout: Duration) -> Result<(), AskError> {
		let target = target.any_ref();
		let (watcher, rx, _registration) = self.shared.register_temp();
		if target.send_system(SystemMessage::Watch { watcher }).is_err() {
			return Ok(());
		}
		let _ = target.send_system(SystemMessage::Stop);
		await_termination(rx, timeout).await
	}

	/// Waits for `target` to terminate without stopping it.
	pub async fn terminated(&self, target: &impl Addressable, timeout: Duration) -> Result<(), AskError> {
		let target = target.any_ref();
		let (watcher, rx, _registration) = self.shared.register_temp();
		if target.send_system(SystemMessage::Watch { watcher }).is_err() {
			return Ok(());
		}
		await_termination(rx, timeout).await
	}

	/// Resolves a path to an untyped reference. Paths of other systems go to
	/// the transport; unknown local paths give a reference whose messages
	/// end up in dead letters.
	pub fn select(&self, path: &ActorPath) -> AnyRef {
		self.shared.select(path)
	}

	/// Typed lookup of a live local actor.
	pub fn lookup<A: Actor>(&self, path: &ActorPath) -> Option<ActorRef<A::Message>> {
		let id = *self.shared.paths.get(path)?;
		let cell = self.shared.cell(id)?;
		let cell = cell.downcast_arc::<CellCore<A>>().ok()?;
		Some(cell.actor_ref())
	}

	/// Lifecycle state of a live local actor.
	pub fn lifecycle(&self, target: &impl Addressable) -> Option<Lifecycle> {
		let id = *self.shared.paths.get(target.any_ref().path())?;
		self.shared.cell(id).map(|cell| cell.lifecycle())
	}

	/// A reference to an actor of another system, reached through the
	/// configured transport.
	pub fn remote_ref<M: Send + 'static>(&self, path: &ActorPath) -> Option<ActorRef<M>> {
		let transport = self.shared.transport.clone()?;
		Some(ActorRef::remote(path.clone(), transport, Arc::downgrade(&self.shared)))
	}

	/// Replaces the dead-letter sink; letters published from now on go to
	/// `sink`.
	pub fn set_dead_letter_sink(&self, sink: Arc<dyn DeadLetterSink>) {
		self.shared.dead_letters.replace(sink);
	}

	/// A configured dispatcher by name, `default` included.
	pub fn dispatcher(&self, name: &str) -> Option<&Dispatcher> {
		self.shared.dispatchers.get(name)
	}

	/// Number of live actors.
	pub fn actor_count(&self) -> usize {
		self.shared.cells.len()
	}

	/// Set as soon as `shutdown` starts; top-level spawns fail from then on.
	pub fn is_terminating(&self) -> bool {
		self.shared.terminating.load(Ordering::SeqCst)
	}

	/// Stops every top-level actor (each of them bottom-up), waits for them,
	/// then stops the dispatchers. Must not be awaited from inside an actor.
	pub async fn shutdown(&self) {
		if self.shared.terminating.swap(true, Ordering::SeqCst) {
			self.when_terminated().await;
			return;
		}
		tracing::info!(system = %self.shared.name, actors = self.shared.cells.len(), "shutting down");

		let top_level = self
			.shared
			.top_level
			.iter()
			.map(|entry| *entry.key())
			.collect::<Vec<_>>();
		for id in top_level {
			if let Some(cell) = self.shared.cell(id) {
				tracing::debug!(path = %cell.path(), "stopping top-level actor");
				let _ = cell.send_system(SystemMessage::Stop);
			}
		}
		self.shared.wait_top_level_empty().await;

		for dispatcher in self.shared.dispatchers.values() {
			dispatcher.shutdown();
		}
		for dispatcher in self.shared.dispatchers.values() {
			dispatcher.join().await;
		}
		self.shared.temps.clear();
		self.shared.shutdown.cancel();
		tracing::info!(system = %self.shared.name, "actor system terminated");
	}

	/// Resolves once `shutdown` completed.
	pub async fn when_terminated(&self) {
		self.shared.shutdown.cancelled().await;
	}
}

/// Collects the configuration, dead-letter sink and transport of a system
/// before it starts.
pub struct ActorSystemBuilder {
	name: String,
	config: SystemConfig,
	dead_letters: Option<Arc<dyn DeadLetterSink>>,
	transport: Option<Arc<dyn Transport>>,
}

impl ActorSystemBuilder {
	/// Dispatchers, supervision defaults and the default mailbox.
	pub fn config(mut self, config: SystemConfig) -> Self {
		self.config = config;
		self
	}

	/// Sink for undeliverable messages. Defaults to [`LoggingDeadLetters`].
	pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
		self.dead_letters = Some(sink);
		self
	}

	/// Outbound transport for paths of other systems. Without one, such
	/// paths resolve to dead references.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Starts the dispatchers on the current tokio runtime.
	pub fn build(self) -> Result<ActorSystem, SystemError> {
		tokio::runtime::Handle::try_current().map_err(|_| SystemError::NoRuntime)?;
		if !is_valid_name(&self.name) {
			return Err(SystemError::InvalidConfig(format!(
				"invalid system name `{}`",
				self.name
			)));
		}
		self.config.validate()?;

		let shutdown = ShutdownToken::new();
		let mut dispatchers = HashMap::new();
		dispatchers.insert(
			DEFAULT_DISPATCHER.to_string(),
			Dispatcher::start(
				DEFAULT_DISPATCHER,
				self.config.default_dispatcher.clone(),
				shutdown.child(),
			),
		);
		for (name, config) in &self.config.dispatchers {
			dispatchers.insert(
				name.clone(),
				Dispatcher::start(name, config.clone(), shutdown.child()),
			);
		}

		let sink = self
			.dead_letters
			.unwrap_or_else(|| Arc::new(LoggingDeadLetters));
		let shared = SystemShared {
			address: ActorPath::root(&self.name),
			default_strategy: Arc::new(SupervisorStrategy::from(&self.config.supervision)),
			name: self.name,
			config: self.config,
			dispatchers,
			cells: DashMap::new(),
			paths: DashMap::new(),
			top_level: DashMap::new(),
			temps: DashMap::new(),
			next_id: AtomicU64::new(1),
			next_temp: AtomicU64::new(1),
			dead_letters: DeadLetters::new(sink),
			transport: self.transport,
			shutdown,
			terminating: AtomicBool::new(false),
			top_level_empty: Notify::new(),
		};

		tracing::info!(
			system = %shared.name,
			dispatchers = shared.dispatchers.len(),
			"actor system started"
		);
		Ok(ActorSystem {
			shared: Arc::new(shared),
		})
	}
}
