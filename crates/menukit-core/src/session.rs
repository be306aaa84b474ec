//! Per-chat render context persisted in the host's session bag.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageId},
    Result,
};

/// Everything the menu layer keeps about one chat.
///
/// `active_message_id` is shared by all menus: only the most recently sent
/// menu message accepts interactions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub active_message_id: Option<MessageId>,
    pub active_menu_loader_args: Option<Value>,
    pub active_menu_loader_data: Option<Value>,
    #[serde(default)]
    pub menus: HashMap<String, MenuSession>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuSession {
    pub state: Option<Value>,
}

impl ChatSession {
    pub fn menu_state(&self, menu_id: &str) -> Option<&Value> {
        self.menus.get(menu_id).and_then(|m| m.state.as_ref())
    }

    pub fn set_menu_state(&mut self, menu_id: &str, state: Option<Value>) {
        self.menus.entry(menu_id.to_string()).or_default().state = state;
    }
}

/// Session bag port.
///
/// Reads and writes happen inside one update's handling; flushing to durable
/// storage (if any) is the implementation's business.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the chat's session, or a fresh default if none exists yet.
    async fn load(&self, chat_id: ChatId) -> Result<ChatSession>;
    async fn save(&self, chat_id: ChatId, session: ChatSession) -> Result<()>;
}

/// Load, mutate and save one chat's session.
///
/// No locking: two concurrent updates for the same chat race on the write.
pub async fn update_session<R>(
    store: &dyn SessionStore,
    chat_id: ChatId,
    f: impl FnOnce(&mut ChatSession) -> R,
) -> Result<R> {
    let mut session = store.load(chat_id).await?;
    let out = f(&mut session);
    store.save(chat_id, session).await?;
    Ok(out)
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    chats: Mutex<HashMap<ChatId, ChatSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chats.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, chat_id: ChatId) -> Result<ChatSession> {
        Ok(self
            .chats
            .lock()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, chat_id: ChatId, session: ChatSession) -> Result<()> {
        self.chats.lock().await.insert(chat_id, session);
        Ok(())
    }
}
