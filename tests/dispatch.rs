mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::Gate;
use common::Log;
use common::TIMEOUT;
use common::block;
use common::log;
use common::system;
use runy_dispatch::Actor;
use runy_dispatch::Context;
use runy_dispatch::DispatcherConfig;
use runy_dispatch::Props;
use runy_dispatch::SystemConfig;

enum Record {
	Item { sender: usize, seq: u64 },
	Snapshot,
}

#[derive(Default)]
struct Recorder {
	seen: HashMap<usize, Vec<u64>>,
}

impl Actor for Recorder {
	type Message = Record;

	async fn receive(&mut self, ctx: &mut Context<Self>, message: Record) -> anyhow::Result<()> {
		match message {
			Record::Item { sender, seq } => self.seen.entry(sender).or_default().push(seq),
			Record::Snapshot => ctx.reply(self.seen.clone()),
		}
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_sender_order_is_preserved() {
	let (system, _) = system("ordering", SystemConfig::default());
	let recorder = system.spawn(Props::<Recorder>::default(), "recorder").unwrap();

	let senders = (0..8)
		.map(|sender| {
			let recorder = recorder.clone();
			tokio::spawn(async move {
				for seq in 0..500 {
					recorder.tell(Record::Item { sender, seq }, None);
				}
			})
		})
		.collect::<Vec<_>>();
	for sender in senders {
		sender.await.unwrap();
	}

	let seen: HashMap<usize, Vec<u64>> = recorder.ask(Record::Snapshot, TIMEOUT).await.unwrap();
	assert_eq!(seen.len(), 8);
	for sequence in seen.values() {
		assert_eq!(*sequence, (0..500u64).collect::<Vec<_>>());
	}

	system.shutdown().await;
}

enum Probe {
	Touch,
	Count,
}

struct Exclusive {
	active: Arc<AtomicUsize>,
	overlaps: Arc<AtomicUsize>,
	handled: usize,
}

impl Actor for Exclusive {
	type Message = Probe;

	async fn receive(&mut self, ctx: &mut Context<Self>, message: Probe) -> anyhow::Result<()> {
		match message {
			Probe::Touch => {
				if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
					self.overlaps.fetch_add(1, Ordering::SeqCst);
				}
				tokio::task::yield_now().await;
				self.active.fetch_sub(1, Ordering::SeqCst);
				self.handled += 1;
			}
			Probe::Count => ctx.reply(self.handled),
		}
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_message_at_a_time_per_actor() {
	let (system, _) = system(
		"exclusive",
		SystemConfig::default().with_default_dispatcher(DispatcherConfig::default().with_pool_size(4)),
	);
	let active = Arc::new(AtomicUsize::new(0));
	let overlaps = Arc::new(AtomicUsize::new(0));
	let overlaps_seen = overlaps.clone();

	let target = system
		.spawn(
			Props::new(move || Exclusive {
				active: active.clone(),
				overlaps: overlaps.clone(),
				handled: 0,
			}),
			"exclusive",
		)
		.unwrap();

	let tasks = (0..8)
		.map(|_| {
			let target = target.clone();
			tokio::spawn(async move {
				for _ in 0..100 {
					target.tell(Probe::Touch, None);
				}
			})
		})
		.collect::<Vec<_>>();
	for task in tasks {
		task.await.unwrap();
	}

	let handled: usize = target.ask(Probe::Count, TIMEOUT).await.unwrap();
	assert_eq!(handled, 800);
	assert_eq!(overlaps_seen.load(Ordering::SeqCst), 0);

	system.shutdown().await;
}

enum Tick {
	Tick,
	Ping,
}

struct Logger {
	name: &'static str,
	log: Log<&'static str>,
}

impl Actor for Logger {
	type Message = Tick;

	async fn receive(&mut self, ctx: &mut Context<Self>, message: Tick) -> anyhow::Result<()> {
		match message {
			Tick::Tick => self.log.lock().push(self.name),
			Tick::Ping => ctx.reply(()),
		}
		Ok(())
	}
}

fn logger(name: &'static str, log: &Log<&'static str>) -> Props<Logger> {
	let log = log.clone();
	Props::new(move || Logger {
		name,
		log: log.clone(),
	})
	.with_dispatcher("single")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn busy_actor_yields_after_throughput() {
	let (system, _) = system(
		"fairness",
		SystemConfig::default().with_dispatcher(
			"single",
			DispatcherConfig::default().with_pool_size(1).with_throughput(5),
		),
	);
	let log = log();
	let gate = system.spawn(Props::new(|| Gate).with_dispatcher("single"), "gate").unwrap();
	let a = system.spawn(logger("a", &log), "a").unwrap();
	let b = system.spawn(logger("b", &log), "b").unwrap();
	a.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	b.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();

	// everything is queued while the only worker is held
	let release = block(&gate).await;
	for _ in 0..12 {
		a.tell(Tick::Tick, None);
	}
	b.tell(Tick::Tick, None);
	release.send(()).unwrap();

	a.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	b.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();

	let mut expected = vec!["a"; 5];
	expected.push("b");
	expected.extend(["a"; 7]);
	assert_eq!(*log.lock(), expected);

	system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatchers_do_not_share_workers() {
	let (system, _) = system(
		"isolation",
		SystemConfig::default().with_dispatcher("single", DispatcherConfig::default().with_pool_size(1)),
	);
	let log = log();
	let gate = system.spawn(Props::new(|| Gate).with_dispatcher("single"), "gate").unwrap();
	let blocked = system.spawn(logger("blocked", &log), "blocked").unwrap();
	let free = system
		.spawn(
			{
				let log = log.clone();
				Props::new(move || Logger {
					name: "free",
					log: log.clone(),
				})
			},
			"free",
		)
		.unwrap();

	let release = block(&gate).await;
	blocked.tell(Tick::Tick, None);
	free.tell(Tick::Tick, None);
	free.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	assert_eq!(*log.lock(), vec!["free"]);

	drop(release);
	blocked.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	assert_eq!(*log.lock(), vec!["free", "blocked"]);

	assert_eq!(system.dispatcher("single").unwrap().pool_size(), 1);
	system.shutdown().await;
}

struct Sluggish {
	name: &'static str,
	log: Log<&'static str>,
}

impl Actor for Sluggish {
	type Message = Tick;

	async fn receive(&mut self, ctx: &mut Context<Self>, message: Tick) -> anyhow::Result<()> {
		match message {
			Tick::Tick => {
				tokio::time::sleep(Duration::from_millis(10)).await;
				self.log.lock().push(self.name);
			}
			Tick::Ping => ctx.reply(()),
		}
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn turn_ends_at_throughput_deadline() {
	let (system, _) = system(
		"deadline",
		SystemConfig::default().with_dispatcher(
			"single",
			DispatcherConfig::default()
				.with_pool_size(1)
				.with_throughput(100)
				.with_throughput_deadline(Duration::from_millis(20)),
		),
	);
	let log = log();
	let sluggish = |name: &'static str| {
		let log = log.clone();
		Props::new(move || Sluggish {
			name,
			log: log.clone(),
		})
		.with_dispatcher("single")
	};
	let gate = system.spawn(Props::new(|| Gate).with_dispatcher("single"), "gate").unwrap();
	let a = system.spawn(sluggish("a"), "a").unwrap();
	let b = system.spawn(sluggish("b"), "b").unwrap();
	a.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	b.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();

	let release = block(&gate).await;
	for _ in 0..10 {
		a.tell(Tick::Tick, None);
	}
	b.tell(Tick::Tick, None);
	release.send(()).unwrap();

	a.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();
	b.ask::<()>(Tick::Ping, TIMEOUT).await.unwrap();

	// each tick takes at least 10ms, so a's first turn ends after at most two
	let log = log.lock().clone();
	assert_eq!(log.len(), 11);
	let b_at = log.iter().position(|name| *name == "b").unwrap();
	assert!((1..=2).contains(&b_at), "b ran at {b_at}: {log:?}");

	system.shutdown().await;
}
