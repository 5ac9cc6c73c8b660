use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use prl_core::domain::ChatId;

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let username = msg.from().and_then(|u| u.username.clone());

    state
        .commands
        .handle(ChatId(msg.chat.id.0), username.as_deref(), text)
        .await;

    Ok(())
}
