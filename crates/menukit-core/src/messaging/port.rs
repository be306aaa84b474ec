use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{CallbackAnswer, InlineKeyboard, MessagingCapabilities, ParseMode},
    Result,
};

/// Messenger port consumed by the menu controller.
///
/// The menu layer never talks to a chat transport directly; adapters implement
/// this trait (see `menukit-telegram`) and tests use an in-memory fake.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: ParseMode,
        keyboard: &InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_menu(
        &self,
        msg: MessageRef,
        text: &str,
        parse_mode: ParseMode,
        keyboard: &InlineKeyboard,
    ) -> Result<()>;

    /// Plain reply without markup; used to surface render failures.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn answer_callback(&self, callback_id: &str, answer: CallbackAnswer) -> Result<()>;
}
