use std::sync::Arc;

use anyhow::Context;
use restaurant_bot::{bot::Controller, config::Config, db::JsonFileStore, session::Sessions};
use teloxide::{dptree, prelude::*};

mod handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(true)
        .with_file(false)
        .pretty()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("fail to setup logging")?;

    let config = Config::from_env()
        .context("No token provided. Set TELEGRAM_BOT_TOKEN environment variable.")?;
    if config.admins().is_empty() {
        tracing::warn!("ADMIN_IDS is empty, nobody can change the catalogue");
    }
    tracing::info!(
        "using catalogue {} with {} admin(s)",
        config.catalogue_path().display(),
        config.admins().len()
    );

    let store = Arc::new(JsonFileStore::new(config.catalogue_path().clone()));
    let controller = Arc::new(Controller::new(store, config.admins().clone()));

    let bot = Bot::new(config.token());
    match bot.delete_webhook().drop_pending_updates(true).await {
        Ok(_) => tracing::info!("webhook deleted"),
        Err(e) => tracing::error!("fail to delete webhook: {e}"),
    }
    if let Err(e) = bot.set_my_commands(handlers::bot_commands()).await {
        tracing::error!("fail to register bot commands: {e}")
    }

    Dispatcher::builder(bot, handlers::handler_schema())
        .dependencies(dptree::deps![Arc::new(Sessions::new()), controller])
        .enable_ctrlc_handler()
        .default_handler(|_| async move {})
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error occur when handling update",
        ))
        .build()
        .dispatch()
        .await;

    Ok(())
}
