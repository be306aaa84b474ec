use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::{Mutex, OwnedMutexGuard};

use menukit_core::{
    config::Config,
    domain::{ChatId, UserId},
    Dispatch, MenuHost,
};

use crate::to_core_query;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub host: MenuHost,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes menu work per chat so two presses on the same menu cannot
/// interleave their session writes.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(bot: Bot, cfg: Arc<Config>, host: MenuHost) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = %me.username(), "bot started");
    }
    tracing::info!(
        menus = host.menus().len(),
        start_menu = %cfg.start_menu,
        allowed_users = cfg.telegram_allowed_users.len(),
        "menu host ready"
    );
    if host.menu(&cfg.start_menu).is_none() {
        anyhow::bail!("start menu {:?} is not registered", cfg.start_menu);
    }

    let state = Arc::new(AppState {
        cfg,
        host,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let query = to_core_query(&q);

    if !state.cfg.is_authorized(Some(query.user_id)) {
        let _ = bot
            .answer_callback_query(q.id)
            .text("Unauthorized".to_string())
            .await;
        return Ok(());
    }

    let _guard = state.chat_locks.lock_chat(query.chat_id.0).await;
    match state.host.dispatch_callback(&query).await {
        Ok(Dispatch::Handled) | Ok(Dispatch::Stale) => {}
        Ok(Dispatch::NotMine) => {
            // End of the chain: nothing else claims this press.
            let _ = bot.answer_callback_query(q.id).await;
        }
        Err(e) => {
            // The menu already alerted the user.
            tracing::error!(
                chat_id = query.chat_id.0,
                user = query.username.as_deref().unwrap_or("unknown"),
                data = %query.data,
                error = %e,
                "menu callback failed"
            );
        }
    }
    Ok(())
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(command) = parse_command(text) else {
        return Ok(());
    };

    if !state.cfg.is_authorized(user_id) {
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    if command != "start" && command != "menu" {
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    let _guard = state.chat_locks.lock_chat(chat_id.0).await;
    match state
        .host
        .send(&state.cfg.start_menu, chat_id, Value::Null)
        .await
    {
        // Render failures were already reported to the chat.
        Ok(_) => {}
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, error = %e, "failed to open start menu");
        }
    }
    Ok(())
}

/// Command name without the leading slash or `@botname` suffix.
fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
