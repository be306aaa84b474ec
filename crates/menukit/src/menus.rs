//! Demo menus: a root screen, a per-chat counter and a paged item list.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use menukit_core::{
    formatting::{escape_html, truncate_label},
    CallbackContext, LayoutBuilder, LoaderOutput, Menu, MenuOptions, RenderContext, Result,
};

const ITEMS: &[&str] = &[
    "Apples", "Bread", "Cheese", "Dates", "Eggs", "Flour", "Grapes", "Honey", "Ice cream",
    "Jam", "Kale",
];
const PAGE_SIZE: usize = 4;
const LABEL_MAX: usize = 24;

pub fn main_menu(options: MenuOptions) -> Result<Menu> {
    Menu::builder("main")
        .options(options)
        .loader(|_ctx: RenderContext| async {
            Ok(LoaderOutput::text("<b>Menu demo</b>\nPick a screen."))
        })
        .layout(|l| {
            l.add_button("Counter", |ctx: CallbackContext| async move {
                ctx.navigate("counter", Value::Null).await?;
                Ok(())
            })
            .add_button("Items", |ctx: CallbackContext| async move {
                ctx.navigate("list", json!({ "page": 0 })).await?;
                Ok(())
            })
            .new_row()
            .add_link_button("Docs", "https://core.telegram.org/bots/features#inline-keyboards")
            .add_copy_button("Share", "/start")
        })
        .build()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: i64,
}

pub fn counter_menu(options: MenuOptions) -> Result<Menu> {
    Menu::builder("counter")
        .options(options)
        .initial_state(Counter::default)
        .loader(|ctx: RenderContext| async move {
            let counter = ctx.state().get::<Counter>().await?.unwrap_or_default();
            Ok(LoaderOutput::text(format!("Count: <b>{}</b>", counter.count)))
        })
        .layout(|l| {
            l.add_button("-1", |ctx: CallbackContext| async move {
                ctx.state().update(|c: &mut Counter| c.count -= 1).await?;
                ctx.refresh(None).await?;
                Ok(())
            })
            .add_button("+1", |ctx: CallbackContext| async move {
                ctx.state().update(|c: &mut Counter| c.count += 1).await?;
                ctx.refresh(None).await?;
                Ok(())
            })
            .new_row()
            .add_button("Reset", |ctx: CallbackContext| async move {
                ctx.state().reset().await?;
                ctx.refresh(None).await?;
                Ok(())
            })
            .add_button("Back", |ctx: CallbackContext| async move {
                ctx.navigate("main", Value::Null).await?;
                Ok(())
            })
        })
        .build()
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    page: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListPage {
    page: usize,
    pages: usize,
    items: Vec<String>,
}

fn list_page(page: usize) -> ListPage {
    let pages = ITEMS.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.min(pages - 1);
    let items = ITEMS
        .iter()
        .skip(page * PAGE_SIZE)
        .take(PAGE_SIZE)
        .map(|s| s.to_string())
        .collect();
    ListPage { page, pages, items }
}

fn pager(mut l: LayoutBuilder, page: &ListPage) -> LayoutBuilder {
    if page.page > 0 {
        let prev = page.page - 1;
        l = l.add_button("<", move |ctx: CallbackContext| async move {
            ctx.refresh(Some(json!({ "page": prev }))).await?;
            Ok(())
        });
    }
    l = l.add_inert_button(format!("{}/{}", page.page + 1, page.pages));
    if page.page + 1 < page.pages {
        let next = page.page + 1;
        l = l.add_button(">", move |ctx: CallbackContext| async move {
            ctx.refresh(Some(json!({ "page": next }))).await?;
            Ok(())
        });
    }
    l
}

pub fn list_menu(options: MenuOptions) -> Result<Menu> {
    Menu::builder("list")
        .options(options)
        .loader(|ctx: RenderContext| async move {
            let args: ListArgs = ctx.args_as()?;
            let page = list_page(args.page);
            let mut text = format!("<b>Items</b> (page {} of {})\n", page.page + 1, page.pages);
            for item in &page.items {
                text.push_str(&format!("\n- {}", escape_html(item)));
            }
            LoaderOutput::text(text).with_data(&page)
        })
        .layout(|l| {
            l.add_dynamic_section_sync(|_ctx, mut l, data| {
                let Ok(page) = serde_json::from_value::<ListPage>(data.clone()) else {
                    return l;
                };
                for (idx, item) in page.items.iter().enumerate() {
                    if idx > 0 && idx % 2 == 0 {
                        l = l.new_row();
                    }
                    let name = item.clone();
                    l = l.add_button(truncate_label(item, LABEL_MAX), move |ctx: CallbackContext| {
                        let name = name.clone();
                        async move {
                            let text = format!("You picked {name}.");
                            ctx.host().messenger().send_text(ctx.chat_id(), &text).await?;
                            Ok(())
                        }
                    });
                }
                pager(l.new_row(), &page)
            })
            .new_row()
            .add_button("Back", |ctx: CallbackContext| async move {
                ctx.navigate("main", Value::Null).await?;
                Ok(())
            })
        })
        .build()
}
