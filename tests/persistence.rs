mod common;

use std::time::Duration;
use std::time::Instant;

use common::TIMEOUT;
use common::system;
use runy_dispatch::Actor;
use runy_dispatch::Context;
use runy_dispatch::InMemoryJournal;
use runy_dispatch::Props;
use runy_dispatch::SystemConfig;

enum Account {
	Deposit(u32),
	Mark,
	History,
}

struct Ledger {
	journal: InMemoryJournal<u32>,
	history: Vec<String>,
}

impl Actor for Ledger {
	type Message = Account;

	async fn receive(&mut self, ctx: &mut Context<Self>, message: Account) -> anyhow::Result<()> {
		match message {
			Account::Deposit(amount) => {
				let amount = ctx.persist(&self.journal, amount).await?;
				self.history.push(format!("persisted {amount}"));
			}
			Account::Mark => self.history.push("mark".to_string()),
			Account::History => ctx.reply(self.history.clone()),
		}
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persisting_holds_back_the_mailbox() {
	let (system, _) = system("ledger", SystemConfig::default());
	let journal = InMemoryJournal::new().with_latency(Duration::from_millis(100));
	let ledger = {
		let journal = journal.clone();
		system
			.spawn(
				Props::new(move || Ledger {
					journal: journal.clone(),
					history: Vec::new(),
				}),
				"ledger",
			)
			.unwrap()
	};

	let start = Instant::now();
	ledger.tell(Account::Deposit(5), None);
	ledger.tell(Account::Mark, None);
	let history: Vec<String> = ledger.ask(Account::History, TIMEOUT).await.unwrap();

	assert!(start.elapsed() >= Duration::from_millis(100));
	assert_eq!(history, vec!["persisted 5".to_string(), "mark".to_string()]);
	assert_eq!(journal.events(ledger.path().as_str()), vec![5]);

	system.shutdown().await;
}
