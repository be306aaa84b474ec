//! Menu controller: render lifecycle and callback dispatch for one menu.
//!
//! Rendering runs `on_enter` -> state resolution -> loader -> layout compile
//! -> handler registration -> session persistence, in that order, with every
//! developer-supplied step bounded by the menu's timeout.
//!
//! Interactions are accepted only for the chat's active menu message (the
//! last one produced by [`Menu::send`], across all menus). Presses on older
//! messages are answered with the stale notice and otherwise ignored.

pub mod context;

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, MessageRef},
    host::{Dispatch, MenuHost},
    layout::{BoxFuture, HandlerMap, LayoutBuilder},
    messaging::types::{
        ButtonAction, CallbackAnswer, CallbackQuery, InlineKeyboard, MessagingCapabilities,
        ParseMode,
    },
    session::{update_session, SessionStore},
    token::{self, ActionKind},
    utils::bounded,
    Error, Result,
};

pub use context::{CallbackContext, RenderContext, StateHandle};
use context::StateInit;

type LoaderFn = Arc<dyn Fn(RenderContext) -> BoxFuture<'static, Result<LoaderOutput>> + Send + Sync>;
type HookFn = Arc<dyn Fn(RenderContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Per-menu behaviour knobs.
#[derive(Clone, Debug)]
pub struct MenuOptions {
    /// Shown when a button on an outdated message is pressed.
    pub stale_message_text: String,
    /// Shown when a loader or handler exceeds `timeout`.
    pub timeout_message_text: String,
    pub timeout: Duration,
    pub parse_mode: ParseMode,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            stale_message_text: "This menu is outdated, open it again.".to_string(),
            timeout_message_text: "Request timed out, please try again.".to_string(),
            timeout: DEFAULT_TIMEOUT,
            parse_mode: ParseMode::Html,
        }
    }
}

/// What a loader returns: message text plus data for dynamic sections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoaderOutput {
    pub text: String,
    pub data: Value,
}

impl LoaderOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: Value::Null,
        }
    }

    pub fn with_value(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_data<T: Serialize>(self, data: &T) -> Result<Self> {
        Ok(self.with_value(serde_json::to_value(data)?))
    }
}

/// Render payload handed to the messenger.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMenu {
    pub text: String,
    pub keyboard: InlineKeyboard,
    pub parse_mode: ParseMode,
}

/// Result of `send`/`navigate`.
///
/// Failures are already reported to the chat when `Failed` is returned.
#[derive(Debug)]
pub enum RenderOutcome {
    Sent(MessageRef),
    Edited(MessageRef),
    Failed(Error),
}

impl RenderOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn message(&self) -> Option<MessageRef> {
        match self {
            Self::Sent(m) | Self::Edited(m) => Some(*m),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

struct MenuInner {
    id: String,
    loader: LoaderFn,
    layout: LayoutBuilder,
    state_init: Option<StateInit>,
    on_enter: Option<HookFn>,
    options: MenuOptions,
    static_handlers: HandlerMap,
    dynamic_handlers: Mutex<HashMap<ChatId, HandlerMap>>,
}

/// A navigable menu. Cheap to clone; clones share handler registries.
#[derive(Clone)]
pub struct Menu {
    inner: Arc<MenuInner>,
}

impl std::fmt::Debug for Menu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Menu")
            .field("id", &self.inner.id)
            .field("static_handlers", &self.inner.static_handlers.len())
            .finish_non_exhaustive()
    }
}

pub struct MenuBuilder {
    id: String,
    loader: Option<LoaderFn>,
    layout: LayoutBuilder,
    state_init: Option<StateInit>,
    on_enter: Option<HookFn>,
    options: MenuOptions,
}

impl MenuBuilder {
    pub fn loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(RenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<LoaderOutput>> + Send + 'static,
    {
        self.loader = Some(Arc::new(
            move |ctx| -> BoxFuture<'static, Result<LoaderOutput>> { Box::pin(loader(ctx)) },
        ));
        self
    }

    /// Declare the keyboard. Called once, with a builder owned by this menu.
    pub fn layout(mut self, declare: impl FnOnce(LayoutBuilder) -> LayoutBuilder) -> Self {
        let empty = LayoutBuilder::new(self.id.clone());
        self.layout = declare(empty);
        self
    }

    /// Initial per-chat state, created on first access.
    pub fn initial_state<T, F>(mut self, init: F) -> Self
    where
        T: Serialize,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.state_init = Some(Arc::new(move || Ok(serde_json::to_value(init())?)));
        self
    }

    /// Hook run at the start of every render, before state resolution.
    pub fn on_enter<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_enter = Some(Arc::new(
            move |ctx| -> BoxFuture<'static, Result<()>> { Box::pin(hook(ctx)) },
        ));
        self
    }

    pub fn options(mut self, options: MenuOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Menu> {
        if !token::is_valid_owner(&self.id) {
            return Err(Error::InvalidMenuId(self.id));
        }
        let loader = self
            .loader
            .ok_or_else(|| Error::Config(format!("menu {} has no loader", self.id)))?;

        let static_handlers = self.layout.static_handlers();
        Ok(Menu {
            inner: Arc::new(MenuInner {
                id: self.id,
                loader,
                layout: self.layout,
                state_init: self.state_init,
                on_enter: self.on_enter,
                options: self.options,
                static_handlers,
                dynamic_handlers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl Menu {
    pub fn builder(id: impl Into<String>) -> MenuBuilder {
        let id = id.into();
        MenuBuilder {
            layout: LayoutBuilder::new(id.clone()),
            id,
            loader: None,
            state_init: None,
            on_enter: None,
            options: MenuOptions::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn options(&self) -> &MenuOptions {
        &self.inner.options
    }

    pub(crate) fn state_handle(&self, sessions: Arc<dyn SessionStore>, chat_id: ChatId) -> StateHandle {
        StateHandle::new(sessions, chat_id, self.id(), self.inner.state_init.clone())
    }

    /// Number of live dynamic handlers for `chat_id`.
    pub async fn dynamic_handler_count(&self, chat_id: ChatId) -> usize {
        self.inner
            .dynamic_handlers
            .lock()
            .await
            .get(&chat_id)
            .map_or(0, HashMap::len)
    }

    fn loader_timeout(&self) -> Error {
        Error::LoaderTimeout(self.inner.options.timeout_message_text.clone())
    }

    fn handler_timeout(&self) -> Error {
        Error::HandlerTimeout(self.inner.options.timeout_message_text.clone())
    }

    /// Run the render pipeline and register this render's dynamic handlers.
    pub async fn render(&self, host: &MenuHost, chat_id: ChatId, args: Value) -> Result<RenderedMenu> {
        let sessions = host.sessions().clone();
        let limit = self.inner.options.timeout;

        // Make sure the chat has a session scaffold before any hook touches it.
        update_session(sessions.as_ref(), chat_id, |_| ()).await?;

        let state = self.state_handle(sessions.clone(), chat_id);
        let ctx = RenderContext::new(chat_id, self.id(), args.clone(), state.clone());

        if let Some(hook) = &self.inner.on_enter {
            bounded(limit, hook(ctx.clone()), || self.loader_timeout()).await?;
        }
        state.value().await?;

        let output = bounded(limit, (self.inner.loader)(ctx.clone()), || self.loader_timeout()).await?;
        let compiled = bounded(
            limit,
            self.inner.layout.compile(&ctx, &output.data),
            || self.loader_timeout(),
        )
        .await?;
        check_limits(
            &host.messenger().capabilities(),
            self.id(),
            &output.text,
            &compiled.keyboard,
        )?;

        // Registration and persistence happen before delivery: a failed send
        // or edit leaves the session describing this render.
        {
            let mut dynamic = self.inner.dynamic_handlers.lock().await;
            if compiled.dynamic_handlers.is_empty() {
                dynamic.remove(&chat_id);
            } else {
                dynamic.insert(chat_id, compiled.dynamic_handlers);
            }
        }

        let data = output.data;
        let stored = data.clone();
        update_session(sessions.as_ref(), chat_id, |s| {
            s.active_menu_loader_args = Some(args);
            s.active_menu_loader_data = Some(stored);
        })
        .await?;

        debug!(menu = %self.id(), chat_id = chat_id.0, "menu rendered");
        Ok(RenderedMenu {
            text: output.text,
            keyboard: compiled.keyboard,
            parse_mode: self.inner.options.parse_mode,
        })
    }

    /// Send this menu as a new message and make it the chat's active menu.
    pub async fn send(&self, host: &MenuHost, chat_id: ChatId, args: Value) -> RenderOutcome {
        let res = async {
            let rendered = self.render(host, chat_id, args).await?;
            let msg = host
                .messenger()
                .send_menu(chat_id, &rendered.text, rendered.parse_mode, &rendered.keyboard)
                .await?;
            update_session(host.sessions().as_ref(), chat_id, |s| {
                s.active_message_id = Some(msg.message_id)
            })
            .await?;
            Ok::<_, Error>(msg)
        }
        .await;

        match res {
            Ok(msg) => {
                info!(
                    menu = %self.id(),
                    chat_id = chat_id.0,
                    message_id = msg.message_id.0,
                    "menu sent"
                );
                RenderOutcome::Sent(msg)
            }
            Err(e) => self.report_render_failure(host, chat_id, e).await,
        }
    }

    /// Replace the active menu message's content with this menu.
    ///
    /// Does not move the active message pointer.
    pub async fn navigate(&self, host: &MenuHost, chat_id: ChatId, args: Value) -> RenderOutcome {
        let res = async {
            let active = host
                .sessions()
                .load(chat_id)
                .await?
                .active_message_id
                .ok_or(Error::NoActiveMessage)?;
            let rendered = self.render(host, chat_id, args).await?;
            let msg = MessageRef {
                chat_id,
                message_id: active,
            };
            host.messenger()
                .edit_menu(msg, &rendered.text, rendered.parse_mode, &rendered.keyboard)
                .await?;
            Ok::<_, Error>(msg)
        }
        .await;

        match res {
            Ok(msg) => {
                debug!(
                    menu = %self.id(),
                    chat_id = chat_id.0,
                    message_id = msg.message_id.0,
                    "menu edited in place"
                );
                RenderOutcome::Edited(msg)
            }
            Err(e) => self.report_render_failure(host, chat_id, e).await,
        }
    }

    async fn report_render_failure(&self, host: &MenuHost, chat_id: ChatId, err: Error) -> RenderOutcome {
        warn!(menu = %self.id(), chat_id = chat_id.0, error = %err, "menu render failed");
        if let Err(e) = host.messenger().send_text(chat_id, &err.to_string()).await {
            warn!(menu = %self.id(), chat_id = chat_id.0, error = %e, "failed to report render failure");
        }
        RenderOutcome::Failed(err)
    }

    /// Route a button press to this menu's handlers.
    ///
    /// `Dispatch::NotMine` means the caller should offer the update to the
    /// next handler. Handler failures are shown to the user and returned.
    pub async fn handle_callback(&self, host: &MenuHost, query: &CallbackQuery) -> Result<Dispatch> {
        let handler = match self.inner.static_handlers.get(&query.data) {
            Some(h) => Some(h.clone()),
            None => self
                .inner
                .dynamic_handlers
                .lock()
                .await
                .get(&query.chat_id)
                .and_then(|handlers| handlers.get(&query.data))
                .cloned(),
        };

        let Some(handler) = handler else {
            return self.handle_unbound(host, query).await;
        };

        match token::decode(handler.token()) {
            Some(tok) if tok.owner == self.id() => {}
            _ => {
                debug!(menu = %self.id(), token = %handler.token(), "handler token owned elsewhere");
                return Ok(Dispatch::NotMine);
            }
        }

        let messenger = host.messenger();
        let session = host.sessions().load(query.chat_id).await?;
        let is_active = matches!(
            (query.message, session.active_message_id),
            (Some(msg), Some(active)) if msg.message_id == active
        );
        if !is_active {
            debug!(
                menu = %self.id(),
                chat_id = query.chat_id.0,
                message = ?query.message.map(|m| m.message_id.0),
                active = ?session.active_message_id.map(|m| m.0),
                "stale menu interaction"
            );
            messenger
                .answer_callback(
                    &query.callback_id,
                    CallbackAnswer::notice(self.inner.options.stale_message_text.clone()),
                )
                .await?;
            return Ok(Dispatch::Stale);
        }

        let ctx = CallbackContext::new(host.clone(), self.clone(), query.clone());
        let res = bounded(self.inner.options.timeout, handler.call(ctx), || {
            self.handler_timeout()
        })
        .await;

        match res {
            Ok(()) => {
                messenger
                    .answer_callback(&query.callback_id, CallbackAnswer::silent())
                    .await?;
                Ok(Dispatch::Handled)
            }
            Err(e) => {
                warn!(
                    menu = %self.id(),
                    chat_id = query.chat_id.0,
                    timeout = e.is_timeout(),
                    error = %e,
                    "menu handler failed"
                );
                if let Err(answer_err) = messenger
                    .answer_callback(&query.callback_id, CallbackAnswer::alert(e.to_string()))
                    .await
                {
                    warn!(error = %answer_err, "failed to answer callback after handler error");
                }
                Err(e)
            }
        }
    }

    /// Presses on handler-less buttons of this menu are acknowledged quietly.
    async fn handle_unbound(&self, host: &MenuHost, query: &CallbackQuery) -> Result<Dispatch> {
        match token::decode(&query.data) {
            Some(tok) if tok.kind == ActionKind::Noop && tok.owner == self.id() => {
                host.messenger()
                    .answer_callback(&query.callback_id, CallbackAnswer::silent())
                    .await?;
                Ok(Dispatch::Handled)
            }
            _ => Ok(Dispatch::NotMine),
        }
    }
}

/// Reject output the messenger cannot deliver.
fn check_limits(
    caps: &MessagingCapabilities,
    menu_id: &str,
    text: &str,
    keyboard: &InlineKeyboard,
) -> Result<()> {
    let len = text.chars().count();
    if len > caps.max_message_len {
        return Err(Error::Limit(format!(
            "menu {menu_id} text is {len} chars, at most {} allowed",
            caps.max_message_len
        )));
    }
    for button in keyboard.rows.iter().flatten() {
        match &button.action {
            ButtonAction::Callback(data) if data.len() > caps.max_callback_data_len => {
                return Err(Error::Limit(format!(
                    "button {:?} of menu {menu_id} has {} bytes of callback data, at most {} allowed",
                    button.label,
                    data.len(),
                    caps.max_callback_data_len
                )));
            }
            ButtonAction::Copy(_) if !caps.supports_copy_buttons => {
                warn!(
                    menu = %menu_id,
                    label = %button.label,
                    "copy button not supported by messenger, using fallback"
                );
            }
            _ => {}
        }
    }
    Ok(())
}
