use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prl_core::{
    commands::CommandService, config::Config, messaging::MessagingPort, monitor::MonitorService,
    ports::AccountClient,
};

use crate::handlers;
use crate::TelegramMessenger;

const SHUTDOWN_ATTEMPTS: usize = 50;
const SHUTDOWN_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct AppState {
    pub commands: CommandService,
}

/// Run the bot's long-polling dispatcher until `cancel` fires.
pub async fn run_polling(
    cfg: Arc<Config>,
    client: Arc<dyn AccountClient>,
    monitor: MonitorService,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    let me = bot.get_me().await?;
    info!(username = %me.username(), "bot started");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState {
        commands: CommandService::new(cfg.target_user_id, client, monitor, messenger),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        cancel.cancelled().await;
        info!("stopping bot");
        // The dispatcher may still be starting up; it rejects shutdown while idle.
        for _ in 0..SHUTDOWN_ATTEMPTS {
            match shutdown.shutdown() {
                Ok(done) => return done.await,
                Err(_) => sleep(SHUTDOWN_RETRY_DELAY).await,
            }
        }
        warn!("bot dispatcher did not accept shutdown");
    });

    dispatcher.dispatch().await;

    info!("bot stopped");
    Ok(())
}
