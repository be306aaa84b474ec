use std::sync::Arc;

use teloxide::Bot;

use menukit_core::{config::Config, session::MemorySessionStore, MenuHost};
use menukit_telegram::TelegramMessenger;

mod menus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    menukit_core::logging::init("menukit")?;

    let cfg = Arc::new(Config::load()?);
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let sessions = Arc::new(MemorySessionStore::new());

    let options = cfg.menu_options();
    let host = MenuHost::builder(messenger, sessions)
        .menu(menus::main_menu(options.clone())?)
        .menu(menus::counter_menu(options.clone())?)
        .menu(menus::list_menu(options)?)
        .build()?;
    tracing::info!(menus = host.menus().len(), "menus registered");

    menukit_telegram::router::run_polling(bot, cfg, host).await
}
