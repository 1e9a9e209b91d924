use std::{fmt, sync::Arc};

use tally_core::{
    CancelReason, CoreError, Deferred, HoldKey, HoldRegistry, Resolution, SerialQueue, TaskError,
    TaskHandle,
};
use tracing::{debug, warn};

use crate::{chat::Chat, ledger::LedgerClient};

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Channel-point redemption towards an entry.
    Fund { entry: String, amount: i64 },
    /// Bits cheered towards an entry; never needs confirmation.
    Cheer { entry: String, bits: i64 },
    Yes,
    No,
    Status,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let cmd = words.next()?.to_ascii_lowercase();

        match cmd.as_str() {
            "!fund" | "!cheer" => {
                let entry = words.next()?.to_ascii_lowercase();
                let amount: i64 = words.next()?.parse().ok().filter(|n| *n > 0)?;
                Some(if cmd == "!fund" {
                    Command::Fund { entry, amount }
                } else {
                    Command::Cheer { entry, bits: amount }
                })
            }
            "!yes" | "yes" => Some(Command::Yes),
            "!no" | "no" => Some(Command::No),
            "!status" => Some(Command::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Redemption,
    Cheer,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Redemption => f.write_str("redemption"),
            Source::Cheer => f.write_str("cheer"),
        }
    }
}

/// Event handlers. Every ledger read-modify-write goes through the shared queue.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<Inner>,
}

struct Inner {
    client: Deferred<LedgerClient>,
    queue: SerialQueue,
    holds: HoldRegistry,
    chat: Chat,
}

impl Bot {
    pub fn new(
        client: Deferred<LedgerClient>,
        queue: SerialQueue,
        holds: HoldRegistry,
        chat: Chat,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                queue,
                holds,
                chat,
            }),
        }
    }

    /// Handle one line of the form `<user> <message>`.
    pub fn handle_line(&self, line: &str) {
        let Some((user, text)) = line.trim().split_once(char::is_whitespace) else {
            return;
        };
        match Command::parse(text) {
            Some(cmd) => self.dispatch(user, cmd),
            None => debug!(user, text, "not a command"),
        }
    }

    pub fn dispatch(&self, user: &str, cmd: Command) {
        match cmd {
            Command::Fund { entry, amount } => self.fund(user, entry, amount, Source::Redemption),
            Command::Cheer { entry, bits } => self.fund(user, entry, bits, Source::Cheer),
            Command::Yes => self.resolve(user, true),
            Command::No => self.resolve(user, false),
            Command::Status => self.status(user),
        }
    }

    fn fund(&self, user: &str, entry: String, amount: i64, source: Source) {
        let bot = self.clone();
        let who = user.to_string();
        let handle = self.inner.queue.submit(format!("{source}:{entry}"), async move {
            bot.apply_funding(&who, &entry, amount, source).await
        });
        self.notify_on_failure(user, handle);
    }

    async fn apply_funding(
        &self,
        user: &str,
        entry: &str,
        amount: i64,
        source: Source,
    ) -> Result<(), TaskError> {
        let ledger = self.inner.client.get().await;
        let row = ledger.read(entry).await.map_err(TaskError::fail)?;

        if amount <= row.remaining() || source == Source::Cheer {
            let funded = row.funded + amount;
            ledger
                .write_funded(entry, funded)
                .await
                .map_err(TaskError::fail)?;
            self.inner
                .chat
                .say(user, format!("added {amount} to {entry} ({funded}/{})", row.goal));
            return Ok(());
        }

        let over = row.funded + amount - row.goal;
        let key = HoldKey::new(user).map_err(TaskError::fail)?;
        let registered = self.inner.holds.register_default(
            key,
            self.on_confirm(user, entry, amount),
            self.on_refund(user, amount),
        );

        match registered {
            Ok(_) => self.inner.chat.say(
                user,
                format!("that overfunds {entry} by {over}; reply !yes to confirm or !no for a refund"),
            ),
            Err(CoreError::HoldConflict { .. }) => self.inner.chat.say(
                user,
                format!("answer your pending confirmation first; {amount} refunded"),
            ),
            Err(e) => return Err(TaskError::fail(e)),
        }
        Ok(())
    }

    /// Queue the confirmed write. The row is read again since other tasks ran meanwhile.
    fn on_confirm(&self, user: &str, entry: &str, amount: i64) -> impl FnOnce() + Send + 'static {
        let bot = self.clone();
        let (user, entry) = (user.to_string(), entry.to_string());

        move || {
            let task_bot = bot.clone();
            let who = user.clone();
            let handle = bot
                .inner
                .queue
                .submit(format!("confirm:{entry}"), async move {
                    let ledger = task_bot.inner.client.get().await;
                    let row = ledger.read(&entry).await.map_err(TaskError::fail)?;
                    let funded = row.funded + amount;
                    ledger
                        .write_funded(&entry, funded)
                        .await
                        .map_err(TaskError::fail)?;
                    task_bot
                        .inner
                        .chat
                        .say(&who, format!("confirmed: {entry} is at {funded}/{}", row.goal));
                    Ok(())
                });
            bot.notify_on_failure(&user, handle);
        }
    }

    fn on_refund(&self, user: &str, amount: i64) -> impl FnOnce(CancelReason) + Send + 'static {
        let chat = self.inner.chat.clone();
        let user = user.to_string();

        move |reason: CancelReason| {
            let why = match reason {
                CancelReason::Declined => "cancelled",
                CancelReason::Expired => "no answer in time",
                CancelReason::Superseded => "replaced by a newer request",
                CancelReason::Shutdown => "bot is shutting down",
            };
            chat.say(&user, format!("{why}; {amount} refunded"));
        }
    }

    fn resolve(&self, user: &str, confirm: bool) {
        let Ok(key) = HoldKey::new(user) else {
            return;
        };
        let resolution = if confirm {
            self.inner.holds.complete(&key)
        } else {
            self.inner.holds.cancel(&key)
        };
        if resolution == Resolution::NoPendingAction {
            self.inner.chat.say(user, "nothing is waiting for your answer");
        }
    }

    fn status(&self, user: &str) {
        let bot = self.clone();
        let who = user.to_string();
        let handle = self.inner.queue.submit("status", async move {
            let ledger = bot.inner.client.get().await;
            let summary = ledger
                .snapshot()
                .into_iter()
                .map(|(name, row)| format!("{name} {}/{}", row.funded, row.goal))
                .collect::<Vec<_>>()
                .join(", ");
            bot.inner.chat.say(&who, summary);
            Ok(())
        });
        self.notify_on_failure(user, handle);
    }

    /// Tell the user when their task could not be completed.
    fn notify_on_failure(&self, user: &str, handle: TaskHandle<()>) {
        let chat = self.inner.chat.clone();
        let user = user.to_string();

        tokio::spawn(async move {
            if let Err(e) = handle.await {
                warn!(user, reason = %e, "request could not be completed");
                chat.say(&user, format!("sorry, that could not be recorded ({e})"));
            }
        });
    }
}
