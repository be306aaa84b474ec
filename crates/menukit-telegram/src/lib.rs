//! Telegram adapter (teloxide).
//!
//! Implements the `menukit-core` MessagingPort over the Telegram Bot API and
//! plugs the menu chain into a teloxide dispatcher (see [`router`]).

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode as TgParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod router;

use menukit_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{
            ButtonAction, CallbackAnswer, CallbackQuery, InlineKeyboard, MessagingCapabilities,
            ParseMode,
        },
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::debug!(wait = ?d, "telegram asked to retry later");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Telegram parse mode for a menu; `None` sends plain text.
pub fn tg_parse_mode(mode: ParseMode) -> Option<TgParseMode> {
    match mode {
        ParseMode::Html => Some(TgParseMode::Html),
        ParseMode::MarkdownV2 => Some(TgParseMode::MarkdownV2),
        ParseMode::Plain => None,
    }
}

/// Convert a compiled menu keyboard into Telegram markup.
///
/// Bot API 6.x has no copy-to-clipboard button, so copy buttons prefill the
/// input field with their content instead.
pub fn to_markup(keyboard: &InlineKeyboard) -> Result<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in &keyboard.rows {
        let mut out = Vec::with_capacity(row.len());
        for button in row {
            let label = button.label.clone();
            let tg = match &button.action {
                ButtonAction::Callback(data) => InlineKeyboardButton::callback(label, data.clone()),
                ButtonAction::Link(url) => {
                    let url = url
                        .parse::<reqwest::Url>()
                        .map_err(|e| Error::External(format!("invalid button url {url:?}: {e}")))?;
                    InlineKeyboardButton::url(label, url)
                }
                ButtonAction::Copy(content) => {
                    InlineKeyboardButton::switch_inline_query_current_chat(label, content.clone())
                }
            };
            out.push(tg);
        }
        rows.push(out);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Strip a teloxide callback query down to what the menu chain needs.
///
/// Queries from inline-mode messages carry no chat; they are keyed by the
/// sender's id and arrive without a message reference.
pub fn to_core_query(q: &teloxide::types::CallbackQuery) -> CallbackQuery {
    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let user_id = UserId(q.from.id.0 as i64);
    CallbackQuery {
        chat_id: message.map_or(ChatId(user_id.0), |m| m.chat_id),
        user_id,
        username: q.from.username.clone(),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_copy_buttons: false,
            max_message_len: 4096,
            max_callback_data_len: 64,
        }
    }

    async fn send_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: ParseMode,
        keyboard: &InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = to_markup(keyboard)?;
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone());
                if let Some(pm) = tg_parse_mode(parse_mode) {
                    req = req.parse_mode(pm);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_menu(
        &self,
        msg: MessageRef,
        text: &str,
        parse_mode: ParseMode,
        keyboard: &InlineKeyboard,
    ) -> Result<()> {
        let markup = to_markup(keyboard)?;
        self.with_retry(|| {
            let mut req = self
                .bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    text.to_string(),
                )
                .reply_markup(markup.clone());
            if let Some(pm) = tg_parse_mode(parse_mode) {
                req = req.parse_mode(pm);
            }
            async move {
                match req.await {
                    // Re-rendering identical content is not a failure.
                    Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
                    other => other.map(|_| ()),
                }
            }
        })
        .await
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback(&self, callback_id: &str, answer: CallbackAnswer) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = &answer.text {
                req = req.text(t.clone());
            }
            if answer.show_alert {
                req = req.show_alert(true);
            }
            req
        })
        .await?;
        Ok(())
    }
}
