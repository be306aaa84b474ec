//! Keyboard layout declaration and per-render compilation.
//!
//! A layout is an ordered list of steps. Static steps are fixed at
//! declaration time; dynamic steps run a generator on every render and may
//! produce a different set of buttons (and handlers) each time.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use crate::{
    menu::{CallbackContext, RenderContext},
    messaging::types::{InlineButton, InlineKeyboard},
    token::{self, ActionKind},
    Result,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type CallbackFn = Arc<dyn Fn(CallbackContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

type SectionFn = Arc<
    dyn Fn(RenderContext, LayoutBuilder, Value) -> BoxFuture<'static, Result<LayoutBuilder>>
        + Send
        + Sync,
>;

/// A button callback bound to the token printed on the button.
#[derive(Clone)]
pub struct ActionHandler {
    token: String,
    callback: CallbackFn,
}

impl ActionHandler {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn call(&self, ctx: CallbackContext) -> BoxFuture<'static, Result<()>> {
        (self.callback)(ctx)
    }
}

impl std::fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandler")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Token -> handler.
pub type HandlerMap = HashMap<String, ActionHandler>;

#[derive(Clone)]
enum Step {
    /// Buttons appended to the current row. No buttons means a row break.
    Static {
        buttons: Vec<InlineButton>,
        handler: Option<ActionHandler>,
    },
    Dynamic(SectionFn),
}

/// Output of one [`LayoutBuilder::compile`] pass.
#[derive(Debug, Default)]
pub struct CompiledLayout {
    pub keyboard: InlineKeyboard,
    /// Handlers declared directly on the builder; identical on every render.
    pub static_handlers: HandlerMap,
    /// Handlers produced by dynamic sections during this render only.
    pub dynamic_handlers: HandlerMap,
}

/// Consuming builder for a menu keyboard, scoped to its owning menu id.
#[derive(Clone)]
pub struct LayoutBuilder {
    menu_id: String,
    steps: Vec<Step>,
}

impl LayoutBuilder {
    pub fn new(menu_id: impl Into<String>) -> Self {
        Self {
            menu_id: menu_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn menu_id(&self) -> &str {
        &self.menu_id
    }

    /// Add a button that runs `on_press` when pressed.
    pub fn add_button<F, Fut>(mut self, text: impl Into<String>, on_press: F) -> Self
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let instance = token::new_instance_id();
        let token = token::encode(ActionKind::Callback, &self.menu_id, Some(&instance));
        let handler = ActionHandler {
            token: token.clone(),
            callback: Arc::new(move |ctx| -> BoxFuture<'static, Result<()>> {
                Box::pin(on_press(ctx))
            }),
        };
        self.steps.push(Step::Static {
            buttons: vec![InlineButton::callback(text, token)],
            handler: Some(handler),
        });
        self
    }

    /// Add a button without a handler; presses are acknowledged and dropped.
    pub fn add_inert_button(mut self, text: impl Into<String>) -> Self {
        let token = token::encode(ActionKind::Noop, &self.menu_id, None);
        self.steps.push(Step::Static {
            buttons: vec![InlineButton::callback(text, token)],
            handler: None,
        });
        self
    }

    /// Add a button that copies `content` on the client.
    pub fn add_copy_button(mut self, text: impl Into<String>, content: impl Into<String>) -> Self {
        self.steps.push(Step::Static {
            buttons: vec![InlineButton::copy(text, content)],
            handler: None,
        });
        self
    }

    /// Add a button that opens `url` on the client.
    pub fn add_link_button(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.steps.push(Step::Static {
            buttons: vec![InlineButton::link(text, url)],
            handler: None,
        });
        self
    }

    pub fn new_row(mut self) -> Self {
        self.steps.push(Step::Static {
            buttons: Vec::new(),
            handler: None,
        });
        self
    }

    /// Add a section generated on every render.
    ///
    /// The generator gets the render context, a fresh builder owned by the
    /// same menu and the loader's data. Each generated button costs one
    /// handler per render, so prefer static buttons where the set is fixed.
    pub fn add_dynamic_section<F, Fut>(mut self, generate: F) -> Self
    where
        F: Fn(RenderContext, LayoutBuilder, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<LayoutBuilder>> + Send + 'static,
    {
        self.steps.push(Step::Dynamic(Arc::new(
            move |ctx, builder, data| -> BoxFuture<'static, Result<LayoutBuilder>> {
                Box::pin(generate(ctx, builder, data))
            },
        )));
        self
    }

    /// Synchronous flavour of [`add_dynamic_section`](Self::add_dynamic_section).
    pub fn add_dynamic_section_sync<F>(self, generate: F) -> Self
    where
        F: Fn(&RenderContext, LayoutBuilder, &Value) -> LayoutBuilder + Send + Sync + 'static,
    {
        let generate = Arc::new(generate);
        self.add_dynamic_section(move |ctx, builder, data| {
            let generate = generate.clone();
            async move { Ok(generate(&ctx, builder, &data)) }
        })
    }

    /// Handlers of the top-level static steps.
    pub fn static_handlers(&self) -> HandlerMap {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Static {
                    handler: Some(h), ..
                } => Some((h.token.clone(), h.clone())),
                _ => None,
            })
            .collect()
    }

    /// Expand all steps into a keyboard plus handler registries.
    pub fn compile<'a>(
        &'a self,
        ctx: &'a RenderContext,
        data: &'a Value,
    ) -> BoxFuture<'a, Result<CompiledLayout>> {
        Box::pin(async move {
            let mut rows: Vec<Vec<InlineButton>> = vec![Vec::new()];
            let mut static_handlers = HandlerMap::new();
            let mut dynamic_handlers = HandlerMap::new();

            for step in &self.steps {
                match step {
                    Step::Static { buttons, handler } => {
                        if buttons.is_empty() {
                            rows.push(Vec::new());
                            continue;
                        }
                        current_row(&mut rows).extend(buttons.iter().cloned());
                        if let Some(h) = handler {
                            static_handlers.insert(h.token.clone(), h.clone());
                        }
                    }
                    Step::Dynamic(generate) => {
                        let nested = LayoutBuilder::new(self.menu_id.clone());
                        let nested = generate(ctx.clone(), nested, data.clone()).await?;
                        let compiled = nested.compile(ctx, data).await?;

                        let mut nested_rows = compiled.keyboard.rows.into_iter();
                        if let Some(first) = nested_rows.next() {
                            current_row(&mut rows).extend(first);
                        }
                        rows.extend(nested_rows);

                        dynamic_handlers.extend(compiled.static_handlers);
                        dynamic_handlers.extend(compiled.dynamic_handlers);
                    }
                }
            }

            rows.retain(|row| !row.is_empty());
            Ok(CompiledLayout {
                keyboard: InlineKeyboard::new(rows),
                static_handlers,
                dynamic_handlers,
            })
        })
    }
}

fn current_row(rows: &mut Vec<Vec<InlineButton>>) -> &mut Vec<InlineButton> {
    if rows.is_empty() {
        rows.push(Vec::new());
    }
    let last = rows.len() - 1;
    &mut rows[last]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChatId,
        menu::context::StateHandle,
        messaging::types::ButtonAction,
        session::MemorySessionStore,
    };
    use serde_json::json;

    fn render_ctx(menu_id: &str) -> RenderContext {
        let store = Arc::new(MemorySessionStore::new());
        let state = StateHandle::new(store, ChatId(1), menu_id, None);
        RenderContext::new(ChatId(1), menu_id, Value::Null, state)
    }

    async fn noop(_ctx: CallbackContext) -> Result<()> {
        Ok(())
    }

    #[tokio::test]
    async fn empty_builder_compiles_to_nothing() {
        let ctx = render_ctx("m");
        let compiled = LayoutBuilder::new("m")
            .compile(&ctx, &Value::Null)
            .await
            .unwrap();
        assert!(compiled.keyboard.is_empty());
        assert!(compiled.static_handlers.is_empty());
        assert!(compiled.dynamic_handlers.is_empty());
    }

    #[tokio::test]
    async fn row_break_splits_rows() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m")
            .add_button("A", noop)
            .new_row()
            .add_button("B", noop);
        let compiled = layout.compile(&ctx, &Value::Null).await.unwrap();

        assert_eq!(compiled.keyboard.labels(), vec![vec!["A"], vec!["B"]]);
        assert_eq!(compiled.static_handlers.len(), 2);
        assert!(compiled.dynamic_handlers.is_empty());
        assert_eq!(compiled.static_handlers.len(), layout.static_handlers().len());
    }

    #[tokio::test]
    async fn dynamic_section_continues_current_row() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m")
            .add_button("A", noop)
            .add_dynamic_section_sync(|_ctx, b, _data| b.add_button("X", noop).add_button("Y", noop));
        let compiled = layout.compile(&ctx, &Value::Null).await.unwrap();

        assert_eq!(compiled.keyboard.labels(), vec![vec!["A", "X", "Y"]]);
        assert_eq!(compiled.static_handlers.len(), 1);
        assert_eq!(compiled.dynamic_handlers.len(), 2);

        for label in ["X", "Y"] {
            let tok = compiled.keyboard.callback_data_for(label).unwrap();
            assert!(compiled.dynamic_handlers.contains_key(tok));
            assert_eq!(token::decode(tok).unwrap().owner, "m");
        }
        let a = compiled.keyboard.callback_data_for("A").unwrap();
        assert!(compiled.static_handlers.contains_key(a));
    }

    #[tokio::test]
    async fn multi_row_dynamic_output_and_trailing_static() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m")
            .add_button("A", noop)
            .add_dynamic_section(|_ctx, b, data| async move {
                let items = data["items"].as_array().cloned().unwrap_or_default();
                let mut b = b;
                for item in items {
                    b = b
                        .add_button(item.as_str().unwrap_or_default().to_string(), noop)
                        .new_row();
                }
                Ok(b)
            })
            .add_button("Back", noop);
        let data = json!({"items": ["one", "two"]});
        let compiled = layout.compile(&ctx, &data).await.unwrap();

        assert_eq!(
            compiled.keyboard.labels(),
            vec![vec!["A", "one"], vec!["two", "Back"]]
        );
        assert_eq!(compiled.dynamic_handlers.len(), 2);
        assert_eq!(compiled.static_handlers.len(), 2);
    }

    #[tokio::test]
    async fn nested_dynamic_sections_are_all_dynamic() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m").add_dynamic_section_sync(|_ctx, b, _data| {
            b.add_button("outer", noop)
                .add_dynamic_section_sync(|_ctx, b, _data| b.add_button("inner", noop))
        });
        let compiled = layout.compile(&ctx, &Value::Null).await.unwrap();

        assert_eq!(compiled.keyboard.labels(), vec![vec!["outer", "inner"]]);
        assert!(compiled.static_handlers.is_empty());
        assert_eq!(compiled.dynamic_handlers.len(), 2);
    }

    #[tokio::test]
    async fn dynamic_tokens_change_between_renders() {
        let ctx = render_ctx("m");
        let layout =
            LayoutBuilder::new("m").add_dynamic_section_sync(|_ctx, b, _data| b.add_button("X", noop));
        let first = layout.compile(&ctx, &Value::Null).await.unwrap();
        let second = layout.compile(&ctx, &Value::Null).await.unwrap();

        let a = first.keyboard.callback_data_for("X").unwrap();
        let b = second.keyboard.callback_data_for("X").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn host_native_buttons_have_no_handlers() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m")
            .add_copy_button("Copy", "secret")
            .add_link_button("Docs", "https://example.com")
            .new_row()
            .new_row()
            .add_inert_button("Page 1/3");
        let compiled = layout.compile(&ctx, &Value::Null).await.unwrap();

        assert_eq!(
            compiled.keyboard.labels(),
            vec![vec!["Copy", "Docs"], vec!["Page 1/3"]]
        );
        assert_eq!(
            compiled.keyboard.rows[0][0].action,
            ButtonAction::Copy("secret".to_string())
        );
        assert_eq!(
            compiled.keyboard.rows[0][1].action,
            ButtonAction::Link("https://example.com".to_string())
        );
        let inert = token::decode(compiled.keyboard.callback_data_for("Page 1/3").unwrap()).unwrap();
        assert_eq!(inert.kind, ActionKind::Noop);
        assert!(compiled.static_handlers.is_empty());
        assert!(compiled.dynamic_handlers.is_empty());
    }

    #[tokio::test]
    async fn generator_errors_abort_compile() {
        let ctx = render_ctx("m");
        let layout = LayoutBuilder::new("m").add_dynamic_section(|_ctx, _b, _data| async {
            Err(crate::Error::handler("no items"))
        });
        let err = layout.compile(&ctx, &Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "no items");
    }
}
