mod bot;
mod chat;
mod ledger;

use std::{sync::Arc, time::Duration};

use tally_core::{
    ConflictPolicy, Deferred, EventBus, HoldConfig, HoldRegistry, QueueConfig, SerialQueue,
    Subscribe,
};
use tally_observe::{Journal, LoggerConfig, logger_init};
use tally_prometheus::PrometheusMetrics;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::{bot::Bot, chat::Chat, ledger::LedgerClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::from_env())?;
    info!("logger initialized");

    // 2) Event subscribers
    let metrics = PrometheusMetrics::new()?;
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Journal::new()), Arc::new(metrics.clone())];
    let bus = EventBus::new(subscribers);

    // 3) Ledger client, resolved in the background like an OAuth handshake
    let client: Deferred<LedgerClient> = Deferred::new();
    {
        let client = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let ledger = LedgerClient::new(Duration::from_millis(150))
                .with_entry("zelda", 5_000)
                .with_entry("metroid", 3_000)
                .with_entry("bank", 100_000);
            if client.settle(ledger).is_ok() {
                info!("ledger client ready");
            }
        });
    }

    // 4) One queue for every sheet write, one registry for confirmations
    let queue = SerialQueue::with_bus(
        QueueConfig::named("sheets").with_task_timeout_ms(15_000),
        bus.clone(),
    );
    let holds = HoldRegistry::with_bus(
        HoldConfig {
            name: "overfund".to_string(),
            conflict: ConflictPolicy::Reject,
            default_timeout_ms: 30_000,
        },
        bus,
    );
    let bot = Bot::new(client, queue.clone(), holds.clone(), Chat::default());

    info!("reading `<user> <message>` lines from stdin; Ctrl+C to stop");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => bot.handle_line(&line),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down...");
    holds.shutdown();
    queue.flush().await;
    print!("{}", metrics.render()?);

    Ok(())
}
