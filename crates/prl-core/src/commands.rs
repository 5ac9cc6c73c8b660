//! Bot command handling, independent of the bot transport.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    domain::{ChatId, UserId},
    messaging::MessagingPort,
    monitor::{MonitorService, StartOutcome},
    ports::AccountClient,
};

pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Available commands: /spy, /chats";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    /// Start monitoring the configured target.
    Spy,
    /// List the account's group chats.
    Chats,
    Unknown,
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if !text.starts_with('/') {
            return BotCommand::Unknown;
        }
        match command_name(text).as_str() {
            "spy" => BotCommand::Spy,
            "chats" => BotCommand::Chats,
            _ => BotCommand::Unknown,
        }
    }
}

fn command_name(text: &str) -> String {
    // Telegram may send `/cmd@botname arg1 ...`
    let first = text.split_whitespace().next().unwrap_or("");
    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

pub fn format_chat_list(chats: &[String]) -> String {
    if chats.is_empty() {
        return "No chats found.".to_string();
    }
    let mut out = String::from("Chat list:\n");
    for (i, chat) in chats.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, chat));
    }
    out
}

/// Turns incoming bot messages into monitoring actions and text replies.
#[derive(Clone)]
pub struct CommandService {
    target: UserId,
    client: Arc<dyn AccountClient>,
    monitor: MonitorService,
    messenger: Arc<dyn MessagingPort>,
}

impl CommandService {
    pub fn new(
        target: UserId,
        client: Arc<dyn AccountClient>,
        monitor: MonitorService,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            target,
            client,
            monitor,
            messenger,
        }
    }

    pub async fn handle(&self, chat_id: ChatId, username: Option<&str>, text: &str) {
        let user = username.unwrap_or("unknown");
        info!(user, text, chat_id = chat_id.0, "message received");

        match BotCommand::parse(text) {
            BotCommand::Spy => self.spy(chat_id, user).await,
            BotCommand::Chats => self.chats(chat_id, user).await,
            BotCommand::Unknown => {
                warn!(command = text, user, chat_id = chat_id.0, "unknown command");
                self.reply(chat_id, UNKNOWN_COMMAND_REPLY).await;
            }
        }
    }

    async fn spy(&self, chat_id: ChatId, initiator: &str) {
        let user_id = self.target;
        let reply = match self.monitor.start(user_id) {
            StartOutcome::Started => {
                info!(user_id = user_id.0, initiator, "monitoring requested");
                format!("Now monitoring user {user_id}.")
            }
            StartOutcome::AlreadyRunning => format!("Already monitoring user {user_id}."),
            StartOutcome::ShuttingDown => "Monitoring is unavailable: shutting down.".to_string(),
        };
        self.reply(chat_id, &reply).await;
    }

    async fn chats(&self, chat_id: ChatId, user: &str) {
        self.reply(chat_id, "Fetching chat list...").await;
        info!(user, chat_id = chat_id.0, "chat list requested");

        let text = match self.client.list_dialogs().await {
            Ok(chats) => {
                info!(count = chats.len(), chat_id = chat_id.0, "sending chat list");
                format_chat_list(&chats)
            }
            Err(e) => {
                error!(error = %e, chat_id = chat_id.0, "failed to list chats");
                format!("Error: {e}")
            }
        };
        self.reply(chat_id, &text).await;
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            error!(error = %e, chat_id = chat_id.0, "failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageId, MessageRef, Presence},
        errors::Error,
        recorder::Recorder,
        Result,
    };
    use async_trait::async_trait;
    use std::{sync::Mutex, time::Duration};
    use tokio_util::sync::CancellationToken;

    struct FakeClient {
        dialogs: Option<Vec<String>>,
    }

    #[async_trait]
    impl AccountClient for FakeClient {
        async fn user_presence(&self, _user_id: UserId) -> Result<Presence> {
            Ok(Presence::Online)
        }

        async fn list_dialogs(&self) -> Result<Vec<String>> {
            self.dialogs
                .clone()
                .ok_or_else(|| Error::External("rpc error 420: FLOOD_WAIT".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        sends: Mutex<Vec<(ChatId, String)>>,
    }

    impl FakeMessenger {
        fn sent(&self) -> Vec<String> {
            self.sends
                .lock()
                .unwrap()
                .iter()
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            let mut sends = self.sends.lock().unwrap();
            sends.push((chat_id, text.to_string()));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(sends.len() as i32),
            })
        }
    }

    struct Harness {
        svc: CommandService,
        monitor: MonitorService,
        messenger: Arc<FakeMessenger>,
        cancel: CancellationToken,
        _dir: tempfile::TempDir,
    }

    fn harness(dialogs: Option<Vec<String>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let client: Arc<dyn AccountClient> = Arc::new(FakeClient { dialogs });
        let recorder = Arc::new(Recorder::new(
            dir.path().join("user_status.json"),
            dir.path().join("last_status.json"),
        ));
        let cancel = CancellationToken::new();
        let monitor = MonitorService::new(
            client.clone(),
            recorder,
            Duration::from_secs(3600),
            4,
            cancel.clone(),
        );
        let messenger = Arc::new(FakeMessenger::default());
        let svc = CommandService::new(UserId(42), client, monitor.clone(), messenger.clone());
        Harness {
            svc,
            monitor,
            messenger,
            cancel,
            _dir: dir,
        }
    }

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(BotCommand::parse("/spy"), BotCommand::Spy);
        assert_eq!(BotCommand::parse("/SPY@relay_bot"), BotCommand::Spy);
        assert_eq!(BotCommand::parse("  /chats extra "), BotCommand::Chats);
        assert_eq!(BotCommand::parse("spy"), BotCommand::Unknown);
        assert_eq!(BotCommand::parse("/stop"), BotCommand::Unknown);
        assert_eq!(BotCommand::parse(""), BotCommand::Unknown);
    }

    #[test]
    fn chat_list_is_numbered() {
        let chats = vec!["Group: a".to_string(), "Group: b".to_string()];
        assert_eq!(format_chat_list(&chats), "Chat list:\n1. Group: a\n2. Group: b\n");
        assert_eq!(format_chat_list(&[]), "No chats found.");
    }

    #[tokio::test]
    async fn spy_starts_monitoring_once() {
        let h = harness(Some(vec![]));

        h.svc.handle(ChatId(1), Some("alice"), "/spy").await;
        assert!(h.monitor.is_monitoring(UserId(42)));
        h.svc.handle(ChatId(1), Some("alice"), "/spy").await;

        assert_eq!(
            h.messenger.sent(),
            vec!["Now monitoring user 42.", "Already monitoring user 42."]
        );
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn chats_lists_dialogs() {
        let h = harness(Some(vec!["Group: Book club".to_string()]));
        h.svc.handle(ChatId(1), None, "/chats").await;
        assert_eq!(
            h.messenger.sent(),
            vec!["Fetching chat list...", "Chat list:\n1. Group: Book club\n"]
        );
    }

    #[tokio::test]
    async fn chats_reports_empty_and_failed_listings() {
        let h = harness(Some(vec![]));
        h.svc.handle(ChatId(1), None, "/chats").await;
        assert_eq!(h.messenger.sent().last().unwrap(), "No chats found.");

        let h = harness(None);
        h.svc.handle(ChatId(1), None, "/chats").await;
        let last = h.messenger.sent().last().unwrap().clone();
        assert!(last.starts_with("Error: "));
        assert!(last.contains("FLOOD_WAIT"));
    }

    #[tokio::test]
    async fn anything_else_gets_the_help_text() {
        let h = harness(Some(vec![]));
        h.svc.handle(ChatId(7), Some("bob"), "hello").await;
        h.svc.handle(ChatId(7), Some("bob"), "/status").await;
        assert_eq!(
            h.messenger.sent(),
            vec![UNKNOWN_COMMAND_REPLY, UNKNOWN_COMMAND_REPLY]
        );
        assert!(!h.monitor.is_monitoring(UserId(42)));
    }
}
