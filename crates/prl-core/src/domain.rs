use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence as reported by the account API.
///
/// Only an explicit "offline since" timestamp is modelled separately; every other
/// remote status (online, recently, hidden, ...) is classified as `Online`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Online,
    /// Epoch seconds the user was last seen online.
    OfflineSince(i64),
}

/// One observation taken by a poll tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceSample {
    pub user_id: UserId,
    pub presence: Presence,
}

impl PresenceSample {
    /// The event to persist for this sample, if it is an offline observation.
    pub fn offline_event(&self) -> Option<StatusEvent> {
        match self.presence {
            Presence::Online => None,
            Presence::OfflineSince(last_online) => Some(StatusEvent {
                user_id: self.user_id,
                last_online,
            }),
        }
    }
}

/// Persisted unit of the status history: `{"user_id": .., "last_online": ..}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub user_id: UserId,
    pub last_online: i64,
}

/// RFC3339 rendering of an epoch-seconds timestamp (falls back to the raw number).
pub fn format_epoch(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
