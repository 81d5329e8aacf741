#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;
use runy_dispatch::Actor;
use runy_dispatch::ActorPath;
use runy_dispatch::ActorRef;
use runy_dispatch::ActorSystem;
use runy_dispatch::Context;
use runy_dispatch::DeadLetter;
use runy_dispatch::DeadLetterReason;
use runy_dispatch::DeadLetterSink;
use runy_dispatch::SystemConfig;
use tokio::sync::oneshot;

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Recorded {
	pub recipient: ActorPath,
	pub reason: DeadLetterReason,
	pub value: Option<u32>,
}

#[derive(Default)]
pub struct RecordingDeadLetters {
	letters: Mutex<Vec<Recorded>>,
}

impl RecordingDeadLetters {
	pub fn letters(&self) -> Vec<Recorded> {
		self.letters.lock().clone()
	}

	pub fn with_reason(&self, reason: DeadLetterReason) -> Vec<Recorded> {
		self.letters
			.lock()
			.iter()
			.filter(|letter| letter.reason == reason)
			.cloned()
			.collect()
	}
}

impl DeadLetterSink for RecordingDeadLetters {
	fn receive(&self, letter: DeadLetter) {
		let value = letter.message::<u32>().copied();
		self.letters.lock().push(Recorded {
			recipient: letter.recipient.clone(),
			reason: letter.reason,
			value,
		});
	}
}

pub fn system(name: &str, config: SystemConfig) -> (ActorSystem, Arc<RecordingDeadLetters>) {
	let letters = Arc::new(RecordingDeadLetters::default());
	let system = ActorSystem::builder(name)
		.config(config)
		.dead_letters(letters.clone())
		.build()
		.unwrap();
	(system, letters)
}

/// Polls `condition` until it holds or `TIMEOUT` passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
	let start = Instant::now();
	while start.elapsed() < TIMEOUT {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	condition()
}

pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
	Arc::new(Mutex::new(Vec::new()))
}

/// Occupies the worker that runs it until released.
pub struct Gate;

pub struct Hold {
	entered: oneshot::Sender<()>,
	release: oneshot::Receiver<()>,
}

impl Actor for Gate {
	type Message = Hold;

	async fn receive(&mut self, _ctx: &mut Context<Self>, message: Hold) -> anyhow::Result<()> {
		let _ = message.entered.send(());
		let _ = message.release.await;
		Ok(())
	}
}

/// Returns once the gate holds its worker; dropping or firing the returned
/// sender lets it go.
pub async fn block(gate: &ActorRef<Hold>) -> oneshot::Sender<()> {
	let (entered, entered_rx) = oneshot::channel();
	let (release_tx, release) = oneshot::channel();
	gate.tell(Hold { entered, release }, None);
	entered_rx.await.unwrap();
	release_tx
}
