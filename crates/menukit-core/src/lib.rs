//! Core of the menu layer: callback tokens, keyboard layouts, menu controllers.
//!
//! This crate is framework-agnostic. Message delivery and the session bag live
//! behind ports (traits) implemented by adapter crates or by the integrator.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod host;
pub mod layout;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod session;
pub mod token;
pub mod utils;

pub use errors::{Error, Result};
pub use host::{Dispatch, MenuHost};
pub use layout::LayoutBuilder;
pub use menu::{CallbackContext, LoaderOutput, Menu, MenuOptions, RenderContext, RenderOutcome};
