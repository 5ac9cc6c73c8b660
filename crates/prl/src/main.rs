use std::sync::Arc;

use prl_account::GatewayClient;
use prl_core::{
    auth::{self, TerminalCredentials},
    config::Config,
    monitor::MonitorService,
    ports::AccountClient,
    recorder::Recorder,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), prl_core::Error> {
    let cfg = Arc::new(Config::load()?);
    prl_core::logging::init("prl", &cfg.log_level)?;

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let gateway = Arc::new(GatewayClient::new(&cfg)?);
    auth::authenticate(gateway.as_ref(), &TerminalCredentials::new()).await?;

    let recorder = Arc::new(Recorder::new(
        cfg.history_file.clone(),
        cfg.last_status_file.clone(),
    ));
    let client: Arc<dyn AccountClient> = gateway;
    let monitor = MonitorService::new(
        client.clone(),
        recorder,
        cfg.poll_interval,
        cfg.record_queue_capacity,
        cancel.clone(),
    );

    info!(target_user = %cfg.target_user_id, "relay starting");

    let bot = prl_telegram::router::run_polling(cfg, client, monitor.clone(), cancel.clone()).await;

    // Stops any pollers still running if the bot exited on its own.
    cancel.cancel();
    monitor.wait().await;
    info!("relay stopped");

    bot.map_err(|e| prl_core::Error::External(format!("telegram bot failed: {e}")))
}

async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
    cancel.cancel();
}
