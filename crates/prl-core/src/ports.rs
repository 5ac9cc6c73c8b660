use async_trait::async_trait;

use crate::{
    domain::{Presence, UserId},
    Result,
};

/// Hexagonal port for the remote user-account API.
///
/// `prl-account` talks to an account gateway in production; tests script it with fakes.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Current presence of `user_id` as reported by the remote API.
    async fn user_presence(&self, user_id: UserId) -> Result<Presence>;

    /// Display titles of the account's dialogs, already labelled for replies.
    async fn list_dialogs(&self) -> Result<Vec<String>>;
}
