use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tracing::debug;

use crate::{
    domain::ChatId,
    menu::{Menu, RenderOutcome},
    messaging::{port::MessagingPort, types::CallbackQuery},
    session::SessionStore,
    Error, Result,
};

/// Outcome of offering a callback query to the menu chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran (or an inert button was acknowledged).
    Handled,
    /// The press targeted an outdated message; the user was told so.
    Stale,
    /// No menu owns this callback data; pass it to the next handler.
    NotMine,
}

struct HostInner {
    messenger: Arc<dyn MessagingPort>,
    sessions: Arc<dyn SessionStore>,
    menus: Vec<Menu>,
    by_id: HashMap<String, usize>,
}

/// The set of co-registered menus plus the ports they render through.
///
/// Cheap to clone. Menus are looked up by id so handlers can navigate to
/// siblings without holding references to them.
#[derive(Clone)]
pub struct MenuHost {
    inner: Arc<HostInner>,
}

impl std::fmt::Debug for MenuHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.inner.menus.iter().map(Menu::id).collect();
        f.debug_struct("MenuHost")
            .field("menus", &ids)
            .finish_non_exhaustive()
    }
}

pub struct MenuHostBuilder {
    messenger: Arc<dyn MessagingPort>,
    sessions: Arc<dyn SessionStore>,
    menus: Vec<Menu>,
}

impl MenuHostBuilder {
    pub fn menu(mut self, menu: Menu) -> Self {
        self.menus.push(menu);
        self
    }

    pub fn build(self) -> Result<MenuHost> {
        let mut by_id = HashMap::new();
        for (idx, menu) in self.menus.iter().enumerate() {
            if by_id.insert(menu.id().to_string(), idx).is_some() {
                return Err(Error::DuplicateMenu(menu.id().to_string()));
            }
        }
        Ok(MenuHost {
            inner: Arc::new(HostInner {
                messenger: self.messenger,
                sessions: self.sessions,
                menus: self.menus,
                by_id,
            }),
        })
    }
}

impl MenuHost {
    pub fn builder(
        messenger: Arc<dyn MessagingPort>,
        sessions: Arc<dyn SessionStore>,
    ) -> MenuHostBuilder {
        MenuHostBuilder {
            messenger,
            sessions,
            menus: Vec::new(),
        }
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.inner.messenger
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.inner.sessions
    }

    pub fn menu(&self, id: &str) -> Option<&Menu> {
        self.inner.by_id.get(id).map(|&idx| &self.inner.menus[idx])
    }

    pub fn menus(&self) -> &[Menu] {
        &self.inner.menus
    }

    /// Send menu `menu_id` as a fresh message (e.g. from a `/start` command).
    pub async fn send(&self, menu_id: &str, chat_id: ChatId, args: Value) -> Result<RenderOutcome> {
        let menu = self
            .menu(menu_id)
            .ok_or_else(|| Error::UnknownMenu(menu_id.to_string()))?;
        Ok(menu.send(self, chat_id, args).await)
    }

    /// Offer a callback query to each menu in registration order.
    pub async fn dispatch_callback(&self, query: &CallbackQuery) -> Result<Dispatch> {
        for menu in self.menus() {
            match menu.handle_callback(self, query).await? {
                Dispatch::NotMine => continue,
                other => return Ok(other),
            }
        }
        debug!(chat_id = query.chat_id.0, data = %query.data, "callback not owned by any menu");
        Ok(Dispatch::NotMine)
    }
}
