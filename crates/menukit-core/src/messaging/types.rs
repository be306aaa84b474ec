use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, MessageRef, UserId};

/// Incoming button press, already stripped of transport specifics.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
    /// The message carrying the pressed keyboard (absent for inline-mode messages).
    pub message: Option<MessageRef>,
}

/// How the transport should answer a callback query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackAnswer {
    pub text: Option<String>,
    pub show_alert: bool,
}

impl CallbackAnswer {
    /// Acknowledge without showing anything.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Short toast at the top of the chat.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: false,
        }
    }

    /// Modal alert the user has to dismiss.
    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Html,
    MarkdownV2,
    Plain,
}

impl std::str::FromStr for ParseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "markdownv2" | "markdown" => Ok(Self::MarkdownV2),
            "plain" | "none" | "" => Ok(Self::Plain),
            other => Err(format!("unknown parse mode: {other}")),
        }
    }
}

/// What pressing a keyboard button does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    /// Routed back to the bot as callback data.
    Callback(String),
    /// Opens a URL on the client.
    Link(String),
    /// Copies text on the client.
    Copy(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Link(url.into()),
        }
    }

    pub fn copy(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Copy(content.into()),
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.action {
            ButtonAction::Callback(data) => Some(data),
            _ => None,
        }
    }
}

/// Inline keyboard as a grid of rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Button labels row by row; handy for logs and assertions.
    pub fn labels(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|b| b.label.clone()).collect())
            .collect()
    }

    /// Find a button by label and return its callback data.
    pub fn callback_data_for(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .flatten()
            .find(|b| b.label == label)
            .and_then(|b| b.callback_data())
    }
}

/// Limits of a messenger implementation, checked on every render.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Without native copy buttons the adapter renders a fallback.
    pub supports_copy_buttons: bool,
    pub max_message_len: usize,
    pub max_callback_data_len: usize,
}
