use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    domain::ChatId,
    host::MenuHost,
    menu::{Menu, RenderOutcome},
    messaging::types::CallbackQuery,
    session::{update_session, SessionStore},
    utils::merge_args,
    Error, Result,
};

pub(crate) type StateInit = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// Accessor for one menu's persisted state in one chat.
///
/// State is created lazily from the menu's initializer on first access and
/// kept until [`reset`](Self::reset) is called.
#[derive(Clone)]
pub struct StateHandle {
    sessions: Arc<dyn SessionStore>,
    chat_id: ChatId,
    menu_id: String,
    init: Option<StateInit>,
}

impl StateHandle {
    pub(crate) fn new(
        sessions: Arc<dyn SessionStore>,
        chat_id: ChatId,
        menu_id: impl Into<String>,
        init: Option<StateInit>,
    ) -> Self {
        Self {
            sessions,
            chat_id,
            menu_id: menu_id.into(),
            init,
        }
    }

    /// Raw state value, initializing it if the menu declares an initializer.
    pub async fn value(&self) -> Result<Option<Value>> {
        let session = self.sessions.load(self.chat_id).await?;
        if let Some(v) = session.menu_state(&self.menu_id) {
            return Ok(Some(v.clone()));
        }
        let Some(init) = &self.init else {
            return Ok(None);
        };

        let initial = init()?;
        let stored = initial.clone();
        update_session(self.sessions.as_ref(), self.chat_id, |s| {
            s.set_menu_state(&self.menu_id, Some(stored))
        })
        .await?;
        Ok(Some(initial))
    }

    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.value().await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, state: &T) -> Result<()> {
        let v = serde_json::to_value(state)?;
        update_session(self.sessions.as_ref(), self.chat_id, |s| {
            s.set_menu_state(&self.menu_id, Some(v))
        })
        .await
    }

    /// Read-modify-write with `T::default()` for a missing state.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let mut state = self.get::<T>().await?.unwrap_or_default();
        f(&mut state);
        self.set(&state).await?;
        Ok(state)
    }

    /// Drop the stored state; the next access re-runs the initializer.
    pub async fn reset(&self) -> Result<()> {
        update_session(self.sessions.as_ref(), self.chat_id, |s| {
            s.set_menu_state(&self.menu_id, None)
        })
        .await
    }
}

/// What loaders, hooks and dynamic sections see during a render.
#[derive(Clone)]
pub struct RenderContext {
    chat_id: ChatId,
    menu_id: String,
    args: Value,
    state: StateHandle,
}

impl RenderContext {
    pub(crate) fn new(
        chat_id: ChatId,
        menu_id: impl Into<String>,
        args: Value,
        state: StateHandle,
    ) -> Self {
        Self {
            chat_id,
            menu_id: menu_id.into(),
            args,
            state,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn menu_id(&self) -> &str {
        &self.menu_id
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Loader arguments decoded into a typed value; `null` maps to `T::default()`.
    pub fn args_as<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.args.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.args.clone())?)
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }
}

/// What a button handler sees; carries the navigation actions.
#[derive(Clone)]
pub struct CallbackContext {
    host: MenuHost,
    menu: Menu,
    query: CallbackQuery,
    state: StateHandle,
}

impl CallbackContext {
    pub(crate) fn new(host: MenuHost, menu: Menu, query: CallbackQuery) -> Self {
        let state = menu.state_handle(host.sessions().clone(), query.chat_id);
        Self {
            host,
            menu,
            query,
            state,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.query.chat_id
    }

    pub fn query(&self) -> &CallbackQuery {
        &self.query
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    pub fn host(&self) -> &MenuHost {
        &self.host
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Arguments of the last loader run in this chat.
    pub async fn loader_args(&self) -> Result<Option<Value>> {
        Ok(self
            .host
            .sessions()
            .load(self.chat_id())
            .await?
            .active_menu_loader_args)
    }

    /// Data returned by the last loader run in this chat.
    pub async fn loader_data<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let session = self.host.sessions().load(self.chat_id()).await?;
        match session.active_menu_loader_data {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Re-render this menu in place with the last arguments, optionally
    /// overridden by `partial` (shallow merge for objects).
    pub async fn refresh(&self, partial: Option<Value>) -> Result<RenderOutcome> {
        let previous = self.loader_args().await?;
        let args = merge_args(previous, partial);
        Ok(self.menu.navigate(&self.host, self.chat_id(), args).await)
    }

    /// Show a sibling menu in the current message.
    ///
    /// The active message pointer is left alone: the message stays live, only
    /// its content switches to the other menu.
    pub async fn navigate(&self, menu_id: &str, args: Value) -> Result<RenderOutcome> {
        let menu = self
            .host
            .menu(menu_id)
            .ok_or_else(|| Error::UnknownMenu(menu_id.to_string()))?;
        Ok(menu.navigate(&self.host, self.chat_id(), args).await)
    }

    pub async fn navigate_to(&self, menu: &Menu, args: Value) -> RenderOutcome {
        menu.navigate(&self.host, self.chat_id(), args).await
    }

    /// Send a sibling menu as a new message, making it the active one.
    pub async fn send(&self, menu_id: &str, args: Value) -> Result<RenderOutcome> {
        let menu = self
            .host
            .menu(menu_id)
            .ok_or_else(|| Error::UnknownMenu(menu_id.to_string()))?;
        Ok(menu.send(&self.host, self.chat_id(), args).await)
    }
}
